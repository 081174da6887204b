use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("OPENPIMS_LOG")
            && !level.is_empty()
        {
            self.log.level = level;
        }

        if let Ok(url) = std::env::var("OPENPIMS_SERVER_URL")
            && crate::api::validate_server_url(&url)
        {
            self.server.default_app_domain = crate::api::extract_domain(&url);
            self.server.default_server_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::core::test_env::ScopedEnv;

    #[test]
    fn log_level_override() {
        let _env = ScopedEnv::clean().with("OPENPIMS_LOG", "trace");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.log.level, "trace");
    }

    #[test]
    fn server_url_override_moves_app_domain() {
        let _env = ScopedEnv::clean().with("OPENPIMS_SERVER_URL", "https://pims.example.org");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.default_server_url, "https://pims.example.org");
        assert_eq!(config.server.default_app_domain, "pims.example.org");
    }

    #[test]
    fn malformed_server_url_is_ignored() {
        let _env = ScopedEnv::clean().with("OPENPIMS_SERVER_URL", "openpims");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.default_server_url, "https://openpims.de");
    }
}
