// Jurisdiction predicates consulted by the generic checks
use crate::config::ValidationConfig;

/// Host-supplied predicates. The core asks these questions and nothing
/// else; business rules live with the caller.
pub trait RulePack {
    fn name(&self) -> &str {
        "generic"
    }

    /// Whether a schema target namespace may use this naming authority.
    fn authority_allowed(&self, _authority: &str) -> bool {
        true
    }

    /// Whether `element(...)` xpointers may be used in hrefs.
    fn element_pointers_allowed(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GenericRules;

impl RulePack for GenericRules {}

/// Rules driven by `ValidationConfig`.
#[derive(Debug, Clone)]
pub struct ConfiguredRules {
    allowed_authorities: Vec<String>,
    element_pointers: bool,
}

impl ConfiguredRules {
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self {
            allowed_authorities: config
                .allowed_authorities
                .iter()
                .map(|a| a.to_ascii_lowercase())
                .collect(),
            element_pointers: config.allow_element_pointers,
        }
    }
}

impl RulePack for ConfiguredRules {
    fn name(&self) -> &str {
        "configured"
    }

    fn authority_allowed(&self, authority: &str) -> bool {
        if self.allowed_authorities.is_empty() {
            return true;
        }
        let authority = authority.to_ascii_lowercase();
        self.allowed_authorities
            .iter()
            .any(|a| authority == *a || authority.ends_with(&format!(".{}", a)))
    }

    fn element_pointers_allowed(&self) -> bool {
        self.element_pointers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_authorities() {
        let config = ValidationConfig {
            allowed_authorities: vec!["Example.com".to_string()],
            ..ValidationConfig::default()
        };
        let rules = ConfiguredRules::from_config(&config);
        assert!(rules.authority_allowed("example.com"));
        assert!(rules.authority_allowed("xbrl.example.com"));
        assert!(!rules.authority_allowed("badexample.com"));
        assert!(rules.element_pointers_allowed());
        assert!(!ConfiguredRules::from_config(&ValidationConfig::restricted()).element_pointers_allowed());
    }
}
