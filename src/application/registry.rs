// ============================================================
// Layer 2 — Component Registry
// ============================================================
// Names in a configuration ("LogisticModel", "CrossEntropyLoss",
// "AdamOptimizer", "BaseConfig") are turned into values by searching
// an ordered list of namespaces. Each namespace is a static table
// built at compile time, so lookup never needs reflection and a
// missing name is an ordinary error value.
//
// Resolution rules:
//   1. Namespaces are searched in the order the caller lists them
//   2. The FIRST namespace containing the name wins
//   3. No namespace containing it → ConfigError::UnknownName
//
// Rule 2 makes namespace order part of the configuration. When a
// later namespace also defines the winning name, the shadowed
// namespaces are logged as a warning so the collision is visible.

use crate::error::ConfigError;

/// A named, ordered table of registry entries.
///
/// `T` is whatever the caller needs back: a zero-argument factory
/// (models, losses), a constructor handle (optimizers) or a builder
/// that still takes the stage (configs).
#[derive(Debug)]
pub struct Namespace<T: 'static> {
    name:    &'static str,
    entries: &'static [(&'static str, T)],
}

impl<T: Copy> Namespace<T> {
    pub const fn new(name: &'static str, entries: &'static [(&'static str, T)]) -> Self {
        Self { name, entries }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, symbol: &str) -> Option<T> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == symbol)
            .map(|&(_, value)| value)
    }

    /// Registered names, in table order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|&(name, _)| name)
    }
}

/// Find `name` in the first namespace that defines it.
///
/// `kind` only labels log lines and errors ("model", "label loss"…).
pub fn resolve<T: Copy>(
    kind:       &'static str,
    name:       &str,
    namespaces: &[&Namespace<T>],
) -> Result<T, ConfigError> {
    let mut hits = namespaces
        .iter()
        .filter_map(|ns| ns.get(name).map(|value| (ns.name(), value)));

    let Some((winner, value)) = hits.next() else {
        return Err(ConfigError::UnknownName {
            kind,
            name:     name.to_string(),
            searched: namespaces.iter().map(|ns| ns.name().to_string()).collect(),
        });
    };

    let shadowed: Vec<&str> = hits.map(|(ns, _)| ns).collect();
    if !shadowed.is_empty() {
        tracing::warn!(
            "{kind} '{name}' is defined in several namespaces; using '{winner}', \
             shadowing [{}]. Namespace order decides which one runs.",
            shadowed.join(", ")
        );
    }

    tracing::debug!("Resolved {kind} '{name}' from namespace '{winner}'");
    Ok(value)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn one() -> u32 { 1 }
    fn two() -> u32 { 2 }
    fn three() -> u32 { 3 }

    type Factory = fn() -> u32;

    static FIRST: Namespace<Factory> = Namespace::new(
        "first",
        &[("Alpha", one as Factory), ("Shared", two as Factory)],
    );
    static SECOND: Namespace<Factory> = Namespace::new(
        "second",
        &[("Beta", three as Factory), ("Shared", three as Factory)],
    );

    #[test]
    fn test_name_in_one_namespace_resolves() {
        let factory = resolve("model", "Beta", &[&FIRST, &SECOND]).unwrap();
        assert_eq!(factory(), 3);
    }

    #[test]
    fn test_unknown_name_lists_searched_namespaces() {
        let err = resolve("model", "Gamma", &[&FIRST, &SECOND]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownName {
                kind:     "model",
                name:     "Gamma".into(),
                searched: vec!["first".into(), "second".into()],
            }
        );
    }

    #[test]
    fn test_duplicate_name_is_first_match_every_time() {
        for _ in 0..16 {
            let factory = resolve("model", "Shared", &[&FIRST, &SECOND]).unwrap();
            assert_eq!(factory(), 2);
        }
        // Swapping the namespace order swaps the winner
        let factory = resolve("model", "Shared", &[&SECOND, &FIRST]).unwrap();
        assert_eq!(factory(), 3);
    }

    #[test]
    fn test_lookup_is_exact_match() {
        assert!(resolve("model", "alpha", &[&FIRST]).is_err());
        assert!(resolve("model", "", &[&FIRST]).is_err());
    }

    #[test]
    fn test_names_keep_table_order() {
        let names: Vec<_> = FIRST.names().collect();
        assert_eq!(names, ["Alpha", "Shared"]);
    }
}
