use crate::error::SuiteError;
use crate::spec::SpecificationType;
use indexmap::IndexMap;
use std::sync::Arc;

/// Registered specifications by qualified name, in registration order.
#[derive(Debug, Default, Clone)]
pub struct SpecCatalog {
    specs: IndexMap<String, Arc<SpecificationType>>,
}

impl SpecCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: SpecificationType) -> Result<Arc<SpecificationType>, SuiteError> {
        if self.specs.contains_key(spec.name()) {
            return Err(SuiteError::DuplicateSpecification(spec.name().to_string()));
        }
        let spec = Arc::new(spec);
        self.specs.insert(spec.name().to_string(), Arc::clone(&spec));
        Ok(spec)
    }

    pub fn with(mut self, spec: SpecificationType) -> Result<Self, SuiteError> {
        self.register(spec)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SpecificationType>> {
        self.specs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SpecificationType>> {
        self.specs.values()
    }

    /// Specifications whose qualified name lies under `location`, a module
    /// path prefix. The empty location matches everything.
    pub fn under<'a>(&'a self, location: &'a str) -> impl Iterator<Item = &'a Arc<SpecificationType>> + 'a {
        self.specs
            .values()
            .filter(move |spec| within(spec.name(), location))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn within(name: &str, location: &str) -> bool {
    let location = location.trim_end_matches("::");
    location.is_empty()
        || name == location
        || name
            .strip_prefix(location)
            .is_some_and(|rest| rest.starts_with("::"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecBuilder;

    #[test]
    fn rejects_duplicate_registration() {
        let mut catalog = SpecCatalog::new();
        catalog
            .register(SpecBuilder::new("demo::StackSpec").build())
            .expect("first registration");
        let err = catalog
            .register(SpecBuilder::new("demo::StackSpec").build())
            .expect_err("duplicate");
        assert_eq!(err, SuiteError::DuplicateSpecification("demo::StackSpec".to_string()));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn locations_match_whole_path_segments() {
        let catalog = SpecCatalog::new()
            .with(SpecBuilder::new("demo::stack::StackSpec").build())
            .and_then(|catalog| catalog.with(SpecBuilder::new("demo::stacked::Other").build()))
            .and_then(|catalog| catalog.with(SpecBuilder::new("tools::Spec").build()))
            .expect("catalog builds");

        let names = |location: &str| -> Vec<String> {
            catalog
                .under(location)
                .map(|spec| spec.name().to_string())
                .collect()
        };
        assert_eq!(names("demo::stack"), vec!["demo::stack::StackSpec"]);
        assert_eq!(names("demo::"), vec!["demo::stack::StackSpec", "demo::stacked::Other"]);
        assert_eq!(names("").len(), 3);
    }
}
