//! Dependency specifier classification.
//!
//! npm dependency values are a small zoo: semver ranges, exact versions,
//! `npm:` aliases, git URLs, tarball URLs, local paths, workspace links and
//! dist-tags. Only ranges, exact versions and aliases can be resolved
//! against the registry; everything else is classified as unresolvable and
//! contributes nothing to an install-size computation.

use node_semver::{Range, Version};

/// A classified dependency specifier.
#[derive(Debug, Clone)]
pub enum DependencySpec {
    /// An exact version (`1.2.3`), matched directly against the packument.
    Exact(Version),
    /// A semver range (`^1.0.0`, `>=2 <3`, `1.x || 2.x`).
    Range(Range),
    /// An `npm:` alias — resolve `spec` against the packument of `name`.
    Alias {
        name: String,
        spec: Box<DependencySpec>,
    },
    /// git/URL/file/path/workspace specifiers and unparseable tags; cannot
    /// be resolved against the registry.
    Unresolvable,
}

impl DependencySpec {
    #[must_use]
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::Unresolvable)
    }
}

const UNRESOLVABLE_PREFIXES: &[&str] = &[
    "git:",
    "git+",
    "github:",
    "gitlab:",
    "bitbucket:",
    "http:",
    "https:",
    "file:",
    "link:",
    "workspace:",
];

/// Classify a raw dependency value.
pub fn parse_spec(raw: &str) -> DependencySpec {
    let raw = raw.trim();

    if let Some(alias) = raw.strip_prefix("npm:") {
        return parse_alias(alias);
    }

    if UNRESOLVABLE_PREFIXES
        .iter()
        .any(|prefix| raw.starts_with(prefix))
        || raw.contains("://")
    {
        return DependencySpec::Unresolvable;
    }

    // GitHub shorthand (`user/repo`); scoped package names also contain a
    // slash but never appear as a bare specifier value.
    if raw.contains('/') {
        return DependencySpec::Unresolvable;
    }

    if raw.is_empty() || raw == "*" {
        return any_range();
    }

    if let Ok(version) = raw.parse::<Version>() {
        return DependencySpec::Exact(version);
    }

    match raw.parse::<Range>() {
        Ok(range) => DependencySpec::Range(range),
        // Dist-tags ("beta", "next") and other oddities land here.
        Err(_) => DependencySpec::Unresolvable,
    }
}

fn parse_alias(alias: &str) -> DependencySpec {
    // `npm:name@range` or `npm:@scope/name@range`; the version separator is
    // the last `@` past position zero.
    let split_at = alias.rfind('@').filter(|idx| *idx > 0);

    let (name, spec) = match split_at {
        Some(idx) => {
            let (name, rest) = alias.split_at(idx);
            (name, parse_spec(&rest[1..]))
        }
        None => (alias, any_range()),
    };

    if name.is_empty() || spec.is_unresolvable() {
        return DependencySpec::Unresolvable;
    }

    DependencySpec::Alias {
        name: name.to_string(),
        spec: Box::new(spec),
    }
}

fn any_range() -> DependencySpec {
    match "*".parse::<Range>() {
        Ok(range) => DependencySpec::Range(range),
        Err(_) => DependencySpec::Unresolvable,
    }
}

/// Follow an alias chain to the package that must actually be fetched.
///
/// Returns the registry name to fetch plus the innermost spec, or `None`
/// for unresolvable specifiers (including malformed alias chains deeper
/// than the nesting cap).
#[must_use]
pub fn flatten(name: &str, spec: DependencySpec) -> Option<(String, DependencySpec)> {
    let mut name = name.to_string();
    let mut spec = spec;

    for _ in 0..4 {
        match spec {
            DependencySpec::Unresolvable => return None,
            DependencySpec::Alias {
                name: target,
                spec: inner,
            } => {
                name = target;
                spec = *inner;
            }
            resolvable => return Some((name, resolvable)),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_versions_take_the_fast_path() {
        match parse_spec("1.2.3") {
            DependencySpec::Exact(v) => assert_eq!(v.to_string(), "1.2.3"),
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn ranges_parse() {
        assert!(matches!(parse_spec("^1.0.0"), DependencySpec::Range(_)));
        assert!(matches!(parse_spec("~2.3.0"), DependencySpec::Range(_)));
        assert!(matches!(parse_spec(">=1 <3"), DependencySpec::Range(_)));
        assert!(matches!(parse_spec("1.x || 2.x"), DependencySpec::Range(_)));
    }

    #[test]
    fn star_and_empty_mean_any() {
        assert!(matches!(parse_spec("*"), DependencySpec::Range(_)));
        assert!(matches!(parse_spec(""), DependencySpec::Range(_)));
    }

    #[test]
    fn non_registry_specifiers_are_unresolvable() {
        for raw in [
            "git://github.com/user/repo.git",
            "git+ssh://git@github.com/user/repo.git",
            "github:user/repo",
            "https://example.com/pkg.tgz",
            "file:../local-pkg",
            "link:../local-pkg",
            "workspace:*",
            "user/repo",
        ] {
            assert!(
                parse_spec(raw).is_unresolvable(),
                "{raw:?} should be unresolvable"
            );
        }
    }

    #[test]
    fn dist_tags_are_unresolvable() {
        assert!(parse_spec("beta").is_unresolvable());
        assert!(parse_spec("next").is_unresolvable());
    }

    #[test]
    fn alias_splits_name_and_range() {
        match parse_spec("npm:left-pad@^1.0.0") {
            DependencySpec::Alias { name, spec } => {
                assert_eq!(name, "left-pad");
                assert!(matches!(*spec, DependencySpec::Range(_)));
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn alias_handles_scoped_names() {
        match parse_spec("npm:@scope/pkg@2.0.0") {
            DependencySpec::Alias { name, spec } => {
                assert_eq!(name, "@scope/pkg");
                assert!(matches!(*spec, DependencySpec::Exact(_)));
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn alias_without_range_means_any() {
        match parse_spec("npm:other-pkg") {
            DependencySpec::Alias { name, spec } => {
                assert_eq!(name, "other-pkg");
                assert!(matches!(*spec, DependencySpec::Range(_)));
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn alias_to_git_is_unresolvable() {
        assert!(parse_spec("npm:pkg@git://example.com/x.git").is_unresolvable());
    }

    #[test]
    fn flatten_passes_plain_specs_through() {
        let (name, spec) = flatten("lodash", parse_spec("^4.0.0")).expect("resolvable");
        assert_eq!(name, "lodash");
        assert!(matches!(spec, DependencySpec::Range(_)));
    }

    #[test]
    fn flatten_follows_alias_chains() {
        let (name, spec) = flatten("my-alias", parse_spec("npm:real-pkg@^1.0.0"))
            .expect("alias should flatten");
        assert_eq!(name, "real-pkg");
        assert!(matches!(spec, DependencySpec::Range(_)));
    }

    #[test]
    fn flatten_drops_unresolvable() {
        assert!(flatten("x", parse_spec("file:../x")).is_none());
    }

    #[test]
    fn flatten_caps_pathological_nesting() {
        // Alias chains this deep do not occur in real metadata; flatten
        // refuses rather than looping.
        let spec = DependencySpec::Alias {
            name: "a".to_string(),
            spec: Box::new(DependencySpec::Alias {
                name: "b".to_string(),
                spec: Box::new(DependencySpec::Alias {
                    name: "c".to_string(),
                    spec: Box::new(DependencySpec::Alias {
                        name: "d".to_string(),
                        spec: Box::new(DependencySpec::Alias {
                            name: "e".to_string(),
                            spec: Box::new(any_range()),
                        }),
                    }),
                }),
            }),
        };
        assert!(flatten("root", spec).is_none());
    }
}
