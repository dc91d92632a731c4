//! Built-in demo units served by the binary.

pub mod prompts;
pub mod resources;
pub mod tools;

use mcp_units::Registry;

/// Registry holding every built-in unit.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    tools::register(&mut registry);
    resources::register(&mut registry);
    prompts::register(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_units::UnitKind;

    #[test]
    fn test_default_registry_inventory() {
        let registry = default_registry();
        let names = |kind| -> Vec<String> {
            registry
                .list_units(kind)
                .iter()
                .map(|r| r.name.clone())
                .collect()
        };
        assert_eq!(names(UnitKind::Action), vec!["add", "echo", "fail"]);
        assert_eq!(names(UnitKind::Datasource), vec!["server-info", "greeting"]);
        assert_eq!(names(UnitKind::Template), vec!["review"]);
    }
}
