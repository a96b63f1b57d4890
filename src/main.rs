// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Liso
//!
//! 单进程、单线程的 HTTP/1.1 源服务器。
//! 核心功能包括：
//! - 基于 `mio` 就绪通知的连接池，不依赖线程即可同时服务多个连接
//! - 可挂起、可恢复的请求解析状态机，慢速客户端不会阻塞其他连接
//! - 静态文件的 GET / HEAD，以及简化的 POST 处理

use std::{env, process};

use liso::{Config, Server};
use log::{error, info, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config as LogConfig, Root},
    encode::pattern::PatternEncoder,
};

const LOG_CONFIG: &str = "config/log4rs.yaml";
const DEFAULT_CONFIG: &str = "config/development.toml";

/// # 程序入口点
///
/// 初始化日志、加载配置、绑定端口并启动事件循环。
fn main() {
    // 1. 初始化日志系统：优先读取 YAML 配置，缺失时退回到仅输出到控制台
    init_logging();

    // 2. 环境配置加载：第一个命令行参数可以指定配置文件
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::from_toml(&config_path);
    info!("配置文件{}已载入", config_path);

    // 3. 网络层初始化：无法绑定端口是唯一的致命错误
    let mut server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!("无法绑定端口，错误：{}", e);
            process::exit(1);
        }
    };

    // 4. 主事件循环
    if let Err(e) = server.run() {
        error!("事件循环异常退出：{}", e);
        process::exit(2);
    }
}

fn init_logging() {
    if log4rs::init_file(LOG_CONFIG, Default::default()).is_ok() {
        return;
    }
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}")))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("无法初始化日志系统：{}", e);
            }
        }
        Err(e) => eprintln!("无法构建日志配置：{}", e),
    }
}
