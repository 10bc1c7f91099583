use std::env;
use std::path::PathBuf;

/// Config holds all application configuration and credentials
#[derive(Debug, Clone)]
pub struct Config {
    pub ipam_base_url: String,
    pub ipam_app_id: String,
    /// Base64 encoded `user:pass`, sent as a Basic authorization header
    pub ipam_auth: String,
    pub ipam_section_id: String,
    pub ipam_insecure_tls: bool,
    pub ipam_label_prefix: String,
    pub mgmt_subnet: String,
    pub nms_base_url: String,
    pub nms_token: String,
    pub router_username: String,
    pub router_password: String,
    pub telco_username: String,
    pub telco_password: String,
    pub telco_hostname_prefix: String,
    pub params_dir: String,
    pub template_path: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub mail_from: String,
    pub mail_to: Vec<String>,
    pub log_file: String,
    pub ping_pause_secs: u64,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    /// A `.env` file in the working directory is read first if present.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            ipam_base_url: get_env("IPAM_BASE_URL", "https://ipam.local"),
            ipam_app_id: get_env("IPAM_APP_ID", "python"),
            ipam_auth: get_env("IPAM_AUTH", ""),
            ipam_section_id: get_env("IPAM_SECTION_ID", "3"),
            ipam_insecure_tls: get_env("IPAM_INSECURE_TLS", "false")
                .parse()
                .unwrap_or(false),
            ipam_label_prefix: get_env("IPAM_LABEL_PREFIX", "Telco Inventory TAG"),
            mgmt_subnet: get_env("MGMT_SUBNET", "10.254.0.0"),
            nms_base_url: get_env("NMS_BASE_URL", "https://librenms.local"),
            nms_token: get_env("NMS_TOKEN", ""),
            router_username: get_env("ROUTER_USERNAME", ""),
            router_password: get_env("ROUTER_PASSWORD", ""),
            telco_username: get_env("TELCO_USERNAME", ""),
            telco_password: get_env("TELCO_PASSWORD", ""),
            telco_hostname_prefix: get_env("TELCO_HOSTNAME_PREFIX", "STRATUS-"),
            params_dir: get_env("PARAMS_DIR", "files"),
            template_path: get_env("TEMPLATE_PATH", "templates/telco280.tera"),
            smtp_host: get_env("SMTP_HOST", "localhost"),
            smtp_port: get_env("SMTP_PORT", "25").parse().unwrap_or(25),
            smtp_username: get_env("SMTP_USERNAME", ""),
            smtp_password: get_env("SMTP_PASSWORD", ""),
            mail_from: get_env("MAIL_FROM", "provisioning@localhost"),
            mail_to: split_list(&get_env("MAIL_TO", "")),
            log_file: get_env("LOG_FILE", "files/log.txt"),
            ping_pause_secs: get_env("PING_PAUSE_SECS", "5").parse().unwrap_or(5),
        }
    }

    /// Path of the per-run parameters document
    pub fn params_path(&self) -> PathBuf {
        PathBuf::from(&self.params_dir).join("CONFIG_PARAMETERS.json")
    }

    /// IPAM hostname label shared by every address of one inventoried Telco
    pub fn inventory_label(&self, inventory_number: &str) -> String {
        format!("{} {}", self.ipam_label_prefix, inventory_number)
    }

    /// Hostname a freshly inventoried Telco answers with before provisioning
    pub fn telco_hostname(&self, inventory_number: &str) -> String {
        format!("{}{}", self.telco_hostname_prefix, inventory_number)
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list("noc@example.net, eng@example.net,,"),
            vec!["noc@example.net".to_string(), "eng@example.net".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_derived_names() {
        let mut cfg = Config::load();
        cfg.ipam_label_prefix = "Telco Inventory TAG".to_string();
        cfg.telco_hostname_prefix = "STRATUS-".to_string();
        cfg.params_dir = "/srv/run".to_string();

        assert_eq!(cfg.inventory_label("1234"), "Telco Inventory TAG 1234");
        assert_eq!(cfg.telco_hostname("1234"), "STRATUS-1234");
        assert_eq!(cfg.params_path(), PathBuf::from("/srv/run/CONFIG_PARAMETERS.json"));
    }
}
