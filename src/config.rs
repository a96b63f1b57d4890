use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;

use crate::param::MAX_CLIENTS;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_www_root")]
    www_root: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_https_port")]
    https_port: u16,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default)]
    max_clients: usize,
}

fn default_www_root() -> String {
    "./www".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_https_port() -> u16 {
    8443
}

fn default_local() -> bool {
    true
}

impl Config {
    pub fn new() -> Self {
        Self {
            www_root: default_www_root(),
            port: default_port(),
            https_port: default_https_port(),
            local: default_local(),
            max_clients: MAX_CLIENTS,
        }
    }

    pub fn from_toml(filename: &str) -> Self {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => {
                error!("无法打开配置文件{}：{}，使用默认配置", filename, e);
                return Config::new();
            }
        };
        let mut str_val = String::new();
        if let Err(e) = file.read_to_string(&mut str_val) {
            error!("无法读取配置文件{}：{}，使用默认配置", filename, e);
            return Config::new();
        }
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(text: &str) -> Self {
        let raw_config: Config = match toml::from_str(text) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象（{}），使用默认配置", e);
                return Config::new();
            }
        };
        raw_config.normalized()
    }

    fn normalized(mut self) -> Self {
        if self.max_clients == 0 {
            self.max_clients = MAX_CLIENTS;
        }
        if self.max_clients > MAX_CLIENTS {
            warn!(
                "max_clients被设置为{}，超过上限{}，将被改为{}。",
                self.max_clients, MAX_CLIENTS, MAX_CLIENTS
            );
            self.max_clients = MAX_CLIENTS;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

// 测试与嵌入场景下使用的构造方法
impl Config {
    pub fn with_www_root(mut self, www_root: &str) -> Self {
        self.www_root = www_root.to_string();
        self
    }

    pub fn with_ports(mut self, port: u16, https_port: u16) -> Self {
        self.port = port;
        self.https_port = https_port;
        self
    }

    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self.normalized()
    }
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn https_port(&self) -> u16 {
        self.https_port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }
}
