//! Runtime configuration shared by the HTTP client and the player.

/// Player and client settings.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    /// `User-Agent` sent when fetching station URLs.
    pub user_agent: String,

    /// Volume percentage (0-100) applied when the player is created.
    pub initial_volume: u8,
}

impl Config {
    /// Highest volume percentage the player accepts.
    pub const MAX_VOLUME: u8 = 100;

    /// Creates a configuration named after this crate.
    ///
    /// # Panics
    ///
    /// Panics if the package name or version contain characters that are
    /// illegal in a `User-Agent` product token.
    #[must_use]
    pub fn new() -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            panic!("application name and/or version invalid (\"{app_name}\"; \"{app_version}\")");
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name})");
        trace!("user agent: {user_agent}");

        Self {
            app_name,
            app_version,
            user_agent,
            initial_volume: Self::MAX_VOLUME,
        }
    }

    /// Returns this configuration with a different initial volume, clamped
    /// to [`MAX_VOLUME`](Self::MAX_VOLUME).
    #[must_use]
    pub fn with_initial_volume(mut self, volume: u8) -> Self {
        self.initial_volume = volume.min(Self::MAX_VOLUME);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_names_crate_and_version() {
        let config = Config::new();
        assert!(config
            .user_agent
            .starts_with(&format!("streamtune/{}", env!("CARGO_PKG_VERSION"))));
        assert_eq!(config.initial_volume, 100);
    }

    #[test]
    fn initial_volume_is_clamped() {
        let config = Config::new().with_initial_volume(250);
        assert_eq!(config.initial_volume, Config::MAX_VOLUME);

        let config = Config::new().with_initial_volume(40);
        assert_eq!(config.initial_volume, 40);
    }
}
