// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 事件循环
//!
//! 单线程驱动：轮询连接池，接受新连接，对每个就绪的客户端连接推进解析并发送响应，
//! 需要时回收连接。所有状态都只被这一个线程访问，因此不需要任何锁。

use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use log::{debug, error, info};
use mio::net::TcpListener;

use crate::{
    config::Config,
    connection::Disposition,
    pool::{ConnectionPool, Ready},
};

pub struct Server {
    config: Config,
    pool: ConnectionPool,
}

impl Server {
    /// 绑定明文端口与安全端口，二者都只做普通的 HTTP 监听
    pub fn bind(config: Config) -> io::Result<Self> {
        let address = match config.local() {
            true => IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            false => IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        };
        let mut listeners = vec![TcpListener::bind(SocketAddr::new(address, config.port()))?];
        if config.https_port() != config.port() || config.https_port() == 0 {
            listeners.push(TcpListener::bind(SocketAddr::new(
                address,
                config.https_port(),
            ))?);
        }
        let pool = ConnectionPool::new(listeners, config.max_clients())?;
        for addr in pool.local_addrs()? {
            info!("服务端在{}上监听Socket连接", addr);
        }
        Ok(Self { config, pool })
    }

    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.pool.local_addrs()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// 永久运行事件循环，只有轮询本身失败时才返回
    pub fn run(&mut self) -> io::Result<()> {
        info!("www root: {}", self.config.www_root());
        loop {
            self.run_once(None)?;
        }
    }

    /// 执行一轮“轮询-分发”，返回本轮处理的就绪事件数
    pub fn run_once(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let ready = self.pool.poll(timeout)?;
        for item in &ready {
            match *item {
                Ready::Listener(index) => self.accept_all(index),
                Ready::Client(slot) => {
                    if self.pool.service(slot, &self.config) == Disposition::Retire {
                        self.pool.retire(slot);
                    }
                }
            }
        }
        Ok(ready.len())
    }

    /// 边沿触发下必须把等待中的连接全部接受完
    fn accept_all(&mut self, index: usize) {
        loop {
            match self.pool.accept_ready(index) {
                Ok(Some((stream, addr))) => match self.pool.admit(stream) {
                    Ok(Some(slot)) => debug!("新的连接：{}，槽位{}", addr, slot),
                    Ok(None) => info!("连接池已满，拒绝来自{}的连接", addr),
                    Err(e) => error!("无法注册来自{}的连接：{}", addr, e),
                },
                Ok(None) => break,
                Err(e) => {
                    error!("accept失败：{}", e);
                    break;
                }
            }
        }
    }
}
