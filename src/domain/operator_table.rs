//! Operator name translation table.
//!
//! Built once before any worker starts and shared by reference afterwards.

use crate::domain::error::AlertgenError;
use crate::domain::range::RangeOperator;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct OperatorTable {
    aliases: HashMap<String, RangeOperator>,
}

const BUILTIN: &[(&str, RangeOperator)] = &[
    ("between", RangeOperator::Between),
    (">", RangeOperator::Gt),
    ("gt", RangeOperator::Gt),
    (">=", RangeOperator::Ge),
    ("ge", RangeOperator::Ge),
    ("gte", RangeOperator::Ge),
    ("<", RangeOperator::Lt),
    ("lt", RangeOperator::Lt),
    ("<=", RangeOperator::Le),
    ("le", RangeOperator::Le),
    ("lte", RangeOperator::Le),
    ("==", RangeOperator::Eq),
    ("=", RangeOperator::Eq),
    ("eq", RangeOperator::Eq),
];

impl Default for OperatorTable {
    fn default() -> Self {
        let aliases = BUILTIN
            .iter()
            .map(|(name, op)| (name.to_string(), *op))
            .collect();
        Self { aliases }
    }
}

impl OperatorTable {
    /// Extend the built-in table with `alias -> canonical` pairs. The canonical
    /// side must already resolve.
    pub fn with_aliases<I, K, V>(mut self, entries: I) -> Result<Self, AlertgenError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (alias, canonical) in entries {
            let op = self
                .resolve(canonical.as_ref())
                .ok_or_else(|| AlertgenError::ConfigInvalid {
                    section: "operators".to_string(),
                    key: alias.as_ref().to_string(),
                    reason: format!("unknown operator '{}'", canonical.as_ref()),
                })?;
            self.aliases.insert(normalize(alias.as_ref()), op);
        }
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Option<RangeOperator> {
        self.aliases.get(&normalize(name)).copied()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
