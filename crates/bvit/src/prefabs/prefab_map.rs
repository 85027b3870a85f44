//! # Named Config Prefabs
//!
//! A [`StaticPreFabMap`] is a `static` table of [`StaticPreFabConfig`] builders.
//! Looking a name up yields a [`PreFabConfig`], which owns a freshly built config
//! that the caller can adjust with [`PreFabConfig::map_config`] before `init`.

use burn::config::Config;
use std::fmt::Debug;

/// A named config builder, suitable for `static` tables.
pub struct StaticPreFabConfig<C: 'static> {
    /// Prefab name; the lookup key.
    pub name: &'static str,

    /// One line description.
    pub description: &'static str,

    /// Builds the config.
    pub builder: fn() -> C,
}

impl<C> StaticPreFabConfig<C> {
    /// Build a new config.
    pub fn new_config(&self) -> C {
        (self.builder)()
    }

    /// Build the config into an owned [`PreFabConfig`].
    pub fn to_prefab(&self) -> PreFabConfig<C> {
        PreFabConfig {
            name: self.name.to_string(),
            description: self.description.to_string(),
            config: self.new_config(),
        }
    }
}

impl<C> Debug for StaticPreFabConfig<C> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StaticPreFabConfig")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// A looked-up prefab, holding its config.
#[derive(Debug, Clone)]
pub struct PreFabConfig<C> {
    /// Prefab name.
    pub name: String,

    /// One line description.
    pub description: String,

    /// The config.
    pub config: C,
}

impl<C: Clone> PreFabConfig<C> {
    /// A copy of the config.
    pub fn new_config(&self) -> C {
        self.config.clone()
    }

    /// Rewrite the config, keeping the name and description.
    pub fn map_config<F>(
        self,
        f: F,
    ) -> Self
    where
        F: FnOnce(C) -> C,
    {
        Self {
            name: self.name,
            description: self.description,
            config: f(self.config),
        }
    }
}

/// A named, static collection of [`StaticPreFabConfig`]s.
#[derive(Debug)]
pub struct StaticPreFabMap<C: 'static> {
    /// Name of the map.
    pub name: &'static str,

    /// Description of the map.
    pub description: &'static str,

    /// Prefabs, in display order.
    pub items: &'static [&'static StaticPreFabConfig<C>],
}

impl<C: Config> StaticPreFabMap<C> {
    /// Names of all prefabs, in display order.
    pub fn names(&self) -> Vec<&'static str> {
        self.items.iter().map(|item| item.name).collect()
    }

    /// Look up a prefab by name.
    pub fn lookup_prefab(
        &self,
        name: &str,
    ) -> Option<PreFabConfig<C>> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.to_prefab())
    }

    /// Look up a prefab by name.
    ///
    /// # Panics
    ///
    /// If there is no prefab named `name`.
    pub fn expect_lookup_prefab(
        &self,
        name: &str,
    ) -> PreFabConfig<C> {
        self.lookup_prefab(name).unwrap_or_else(|| {
            panic!(
                "no prefab named {name:?} in {:?}; available: {:?}",
                self.name,
                self.names()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Config, Debug)]
    struct TestConfig {
        size: usize,
    }

    static TEST_MAP: StaticPreFabMap<TestConfig> = StaticPreFabMap {
        name: "test",
        description: "test prefabs",
        items: &[
            &StaticPreFabConfig {
                name: "small",
                description: "small",
                builder: || TestConfig::new(1),
            },
            &StaticPreFabConfig {
                name: "large",
                description: "large",
                builder: || TestConfig::new(100),
            },
        ],
    };

    #[test]
    fn test_lookup() {
        assert_eq!(TEST_MAP.names(), vec!["small", "large"]);

        let prefab = TEST_MAP.expect_lookup_prefab("large");
        assert_eq!(prefab.name, "large");
        assert_eq!(prefab.new_config().size, 100);

        assert!(TEST_MAP.lookup_prefab("medium").is_none());
    }

    #[test]
    #[should_panic(expected = "no prefab named \"medium\"")]
    fn test_expect_lookup_missing() {
        TEST_MAP.expect_lookup_prefab("medium");
    }

    #[test]
    fn test_map_config() {
        let prefab = TEST_MAP
            .expect_lookup_prefab("small")
            .map_config(|config| TestConfig::new(config.size + 1));
        assert_eq!(prefab.name, "small");
        assert_eq!(prefab.config.size, 2);
    }

    #[test]
    fn test_static_debug() {
        let text = format!("{:?}", TEST_MAP.items[0]);
        assert_eq!(
            text,
            "StaticPreFabConfig { name: \"small\", description: \"small\" }"
        );
    }
}
