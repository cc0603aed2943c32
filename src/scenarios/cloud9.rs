use crate::assertion::Assertion;
use crate::lifecycle::{Step, TestCase};
use crate::probe::cloud9::RESOURCE_TYPE;
use crate::resource::{Address, ResourceSpec, Value};

const INSTANCE_TYPE: &str = "t2.micro";
const NAME: &str = "test";

pub fn environment_address() -> Address {
    Address::new(RESOURCE_TYPE, NAME)
}

/// Create an environment, then rename it in place.
pub fn basic(suffix: &str) -> TestCase {
    let address = environment_address();
    let name = format!("tf_acc_env_basic_{suffix}");
    let updated = format!("tf_acc_env_basic_updated_{suffix}");

    TestCase::new("cloud9_basic")
        .step(Step::apply([environment(&name)]).checks(checks(&address, &name)))
        .step(
            Step::apply([environment(&updated)])
                .checks(checks(&address, &updated))
                .check(Assertion::stable(&address)),
        )
}

/// Every optional argument, placed into a subnet with a route to the internet.
pub fn all_fields(suffix: &str) -> TestCase {
    let address = environment_address();
    let name = format!("tf_acc_env_all_fields_{suffix}");
    let updated = format!("tf_acc_env_all_fields_updated_{suffix}");
    let description = format!("Tf Acc Test {suffix}");
    let updated_description = format!("Tf Acc Test Updated {suffix}");

    let step = |name: &str, description: &str| {
        let mut resources = vec![full_environment(name, description)];
        resources.extend(network());
        Step::apply(resources)
            .checks(checks(&address, name))
            .check(Assertion::set(&address, "type"))
            .check(Assertion::equals(&address, "description", description))
            .check(Assertion::equals(&address, "automatic_stop_time_minutes", "60"))
    };

    TestCase::new("cloud9_all_fields")
        .step(step(&name, &description))
        .step(step(&updated, &updated_description).check(Assertion::stable(&address)))
}

/// Create, then confirm the environment can be re-imported by id alone.
pub fn import_basic(suffix: &str) -> TestCase {
    let address = environment_address();
    let name = format!("tf_acc_api_doc_part_import_{suffix}");

    TestCase::new("cloud9_import_basic")
        .step(
            Step::apply([environment(&name)])
                .checks(checks(&address, &name))
                .check(Assertion::set(&address, "type")),
        )
        // The API never reports the instance type back.
        .step(Step::import(&address).ignore(["instance_type"]))
}

fn environment(name: &str) -> ResourceSpec {
    ResourceSpec::new(RESOURCE_TYPE, NAME)
        .attr("instance_type", INSTANCE_TYPE)
        .attr("name", name)
}

fn full_environment(name: &str, description: &str) -> ResourceSpec {
    environment(name)
        .attr("description", description)
        .attr("automatic_stop_time_minutes", 60)
        .attr("subnet_id", subnet().attr("id"))
        .depends_on(Address::new("aws_route_table_association", NAME))
}

fn subnet() -> Address {
    Address::new("aws_subnet", NAME)
}

fn network() -> Vec<ResourceSpec> {
    let vpc = Address::new("aws_vpc", NAME);
    let gateway = Address::new("aws_internet_gateway", NAME);
    let route_table = Address::new("aws_route_table", NAME);

    vec![
        ResourceSpec::new("aws_vpc", NAME).attr("cidr_block", "10.10.0.0/16"),
        ResourceSpec::new("aws_subnet", NAME)
            .attr("vpc_id", vpc.attr("id"))
            .attr("cidr_block", "10.10.0.0/19"),
        ResourceSpec::new("aws_internet_gateway", NAME).attr("vpc_id", vpc.attr("id")),
        ResourceSpec::new("aws_route_table", NAME)
            .attr("vpc_id", vpc.attr("id"))
            .attr(
                "route",
                Value::block([
                    ("cidr_block", Value::from("0.0.0.0/0")),
                    ("gateway_id", gateway.attr("id")),
                ]),
            ),
        ResourceSpec::new("aws_route_table_association", NAME)
            .attr("subnet_id", subnet().attr("id"))
            .attr("route_table_id", route_table.attr("id")),
    ]
}

fn checks(address: &Address, name: &str) -> Vec<Assertion> {
    vec![
        Assertion::equals(address, "instance_type", INSTANCE_TYPE),
        Assertion::equals(address, "name", name),
        Assertion::set(address, "arn"),
        Assertion::set(address, "owner_arn"),
        Assertion::probed(address, "name", name),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render_all;
    use crate::schema::Schema;

    #[test]
    fn test_basic_names() {
        let case = basic("abcdefgh");
        assert_eq!(case.steps.len(), 2);
        let names: Vec<_> = case
            .steps
            .iter()
            .map(|s| s.resources[0].attributes.get("name").cloned())
            .collect();
        assert_eq!(
            names,
            vec![
                Some(Value::from("tf_acc_env_basic_abcdefgh")),
                Some(Value::from("tf_acc_env_basic_updated_abcdefgh")),
            ]
        );
    }

    #[test]
    fn test_all_fields_renders_against_schema() {
        let case = all_fields("abcdefgh");
        let schema = Schema::aws();
        for step in &case.steps {
            let config = render_all(&step.resources, &schema).unwrap();
            assert_eq!(config.resources.len(), 6);
            assert!(config.text.contains("automatic_stop_time_minutes = 60"));
            assert!(config.text.contains("depends_on = [aws_route_table_association.test]"));
            assert!(config.text.contains("subnet_id                   = aws_subnet.test.id"));
        }
    }

    #[test]
    fn test_import_ignores_instance_type() {
        let case = import_basic("abcdefgh");
        let import = case.steps[1].import.as_ref().unwrap();
        assert_eq!(import.address, environment_address());
        assert!(import.ignore.contains("instance_type"));
        assert!(case.steps[1].resources.is_empty());
    }
}
