use thiserror::Error;

pub const ACCEPTANCE_ENV: &str = "TF_ACC";
const REGION_ENV: [&str; 2] = ["AWS_REGION", "AWS_DEFAULT_REGION"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreCheckError {
    #[error("environment variable {0} must be set")]
    MissingEnv(String),

    #[error("no AWS region configured; set AWS_REGION or pass --region")]
    NoRegion,

    #[error("{0}")]
    Failed(String),
}

/// Validates the ambient environment before anything is created.
pub trait PreCheck: Send + Sync {
    fn check(&self) -> Result<(), PreCheckError>;
}

impl<F> PreCheck for F
where
    F: Fn() -> Result<(), PreCheckError> + Send + Sync,
{
    fn check(&self) -> Result<(), PreCheckError> {
        self()
    }
}

/// Acceptance runs are opt-in through `TF_ACC` and need a region.
#[derive(Debug, Clone, Default)]
pub struct EnvPreCheck {
    required: Vec<String>,
    region: Option<String>,
}

impl EnvPreCheck {
    pub fn acceptance(region: Option<String>) -> Self {
        Self {
            required: vec![ACCEPTANCE_ENV.to_string()],
            region,
        }
    }

    pub fn require(mut self, var: impl Into<String>) -> Self {
        self.required.push(var.into());
        self
    }
}

impl PreCheck for EnvPreCheck {
    fn check(&self) -> Result<(), PreCheckError> {
        if let Some(missing) = self.required.iter().find(|var| !is_set(var)) {
            return Err(PreCheckError::MissingEnv(missing.clone()));
        }

        let has_region = self.region.as_deref().is_some_and(|r| !r.is_empty())
            || REGION_ENV.iter().any(|var| is_set(var));
        if !has_region {
            return Err(PreCheckError::NoRegion);
        }

        Ok(())
    }
}

fn is_set(var: &str) -> bool {
    std::env::var(var).is_ok_and(|v| !v.is_empty())
}
