use std::error::Error as _;

use tabled::settings::Style;
use tabled::{Table, Tabled};
use termtree::Tree;

use crate::error::RunError;
use crate::lifecycle::{RunReport, TeardownReport};

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "Step")]
    step: usize,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Resources")]
    resources: String,
    #[tabled(rename = "Checks")]
    assertions: usize,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
}

pub fn step_table(report: &RunReport) -> String {
    let rows: Vec<StepRow> = report
        .steps
        .iter()
        .map(|step| StepRow {
            step: step.step,
            kind: step.kind.to_string(),
            resources: step
                .identifiers
                .iter()
                .map(|(address, id)| format!("{address} = {id}"))
                .collect::<Vec<_>>()
                .join("\n"),
            assertions: step.assertions,
            elapsed: format!("{:.1}s", step.elapsed.as_secs_f64()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Case -> steps -> identifiers, plus a teardown leaf.
pub fn case_tree(report: &RunReport) -> Tree<String> {
    let mut root = Tree::new(format!("{} ok", report.case));
    for step in &report.steps {
        let mut node = Tree::new(format!("step {} ({})", step.step, step.kind));
        for (address, id) in &step.identifiers {
            node.push(format!("{address} = {id}"));
        }
        root.push(node);
    }
    root.push(teardown_label(&report.teardown));
    root
}

pub fn failure_tree(case: &str, err: &RunError) -> Tree<String> {
    let mut root = Tree::new(format!("{case} FAILED"));
    let mut parent = err.to_string();
    let mut cause = Tree::new(parent.clone());
    let mut source = err.source();
    // Most errors already embed their source's message; only show what is new.
    while let Some(inner) = source {
        let text = inner.to_string();
        if !parent.ends_with(&text) {
            cause.push(text.clone());
        }
        parent = text;
        source = inner.source();
    }
    root.push(cause);
    if let Some(teardown) = err.teardown_error()
        && !matches!(err, RunError::Teardown(_))
    {
        root.push(format!("teardown also failed: {teardown}"));
    }
    root
}

fn teardown_label(teardown: &TeardownReport) -> String {
    match teardown {
        TeardownReport::Skipped => "teardown skipped".to_string(),
        TeardownReport::Destroyed { verified } => {
            format!("destroyed, {verified} verified gone")
        }
    }
}
