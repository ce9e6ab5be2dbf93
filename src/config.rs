use std::time::Duration;

/// Runtime configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shell command that fetches the new artifact.
    pub pull_cmd: String,
    /// Shell command that prints the artifact id to stdout.
    pub id_cmd: String,
    /// Shell command template launching a child; `<<PORT>>` and
    /// `<<HEALTHCHECK>>` are substituted before execution.
    pub exec_cmd: String,
    pub interval: Duration,
    pub healthcheck_path: String,
    pub health_timeout: Duration,
    pub listen_port: u16,
    pub child_port1: u16,
    pub child_port2: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pull_cmd: String::new(),
            id_cmd: String::new(),
            exec_cmd: String::new(),
            interval: Duration::from_secs(60),
            healthcheck_path: "/heathz".to_string(),
            health_timeout: Duration::from_secs(30),
            listen_port: 8080,
            child_port1: 9101,
            child_port2: 9102,
        }
    }
}

impl Config {
    pub fn new(pull_cmd: String, id_cmd: String, exec_cmd: String) -> Self {
        Self {
            pull_cmd,
            id_cmd,
            exec_cmd,
            ..Default::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_healthcheck_path(mut self, path: impl Into<String>) -> Self {
        self.healthcheck_path = path.into();
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_child_ports(mut self, port1: u16, port2: u16) -> Self {
        self.child_port1 = port1;
        self.child_port2 = port2;
        self
    }
}
