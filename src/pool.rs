// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接池
//!
//! 连接池负责：
//! - 通过 `mio` 的就绪通知统一观察监听套接字与所有客户端连接；
//! - 以固定容量的槽位数组保存连接，槽位下标即 `mio::Token`；
//! - 维护高水位线、最大描述符、本轮就绪事件数以及“已满”标志。
//!
//! “已满”标志一旦置位便不再清除：之后到来的连接在传输层直接被关闭，
//! 即使已有连接被回收、空出了槽位。

use std::{
    io::{self, ErrorKind},
    net::{Shutdown, SocketAddr},
    os::unix::io::{AsRawFd, RawFd},
    time::Duration,
};

use log::{debug, error, warn};
use mio::{
    net::{TcpListener, TcpStream},
    Events, Interest, Poll, Token,
};

use crate::{
    config::Config,
    connection::{Connection, Disposition},
};

/// 监听套接字使用的 Token 从这里开始，客户端 Token 等于槽位下标
const LISTENER_TOKEN_BASE: usize = usize::MAX / 2;

const EVENTS_CAPACITY: usize = 1024;

/// 固定容量的槽位数组，每个槽位要么为空，要么恰好持有一个元素。
pub struct SlotArena<T> {
    slots: Vec<Option<T>>,
    /// 曾经被占用过的最大下标
    maxi: Option<usize>,
    is_full: bool,
}

impl<T> SlotArena<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            maxi: None,
            is_full: false,
        }
    }

    /// 放入第一个空槽位，返回其下标。
    ///
    /// 已满标志置位后一律拒绝；找不到空槽位时置位已满标志并拒绝。被拒绝的元素原样交还。
    pub fn insert(&mut self, value: T) -> Result<usize, T> {
        if self.is_full {
            return Err(value);
        }
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(value);
                if self.maxi.map_or(true, |maxi| index > maxi) {
                    self.maxi = Some(index);
                }
                Ok(index)
            }
            None => {
                self.is_full = true;
                Err(value)
            }
        }
    }

    /// 清空槽位并交还其中的元素，不会清除已满标志
    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub fn is_full(&self) -> bool {
        self.is_full
    }

    pub fn high_water_mark(&self) -> Option<usize> {
        self.maxi
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 当前存活的元素个数
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 一次轮询中就绪的对象
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ready {
    /// 监听套接字（下标对应 `ConnectionPool::new` 传入的顺序）
    Listener(usize),
    /// 客户端连接（槽位下标）
    Client(usize),
}

pub struct ConnectionPool {
    poll: Poll,
    events: Events,
    listeners: Vec<TcpListener>,
    clients: SlotArena<Connection<TcpStream>>,
    maxfd: RawFd,
    nready: usize,
    next_id: u128,
}

impl ConnectionPool {
    /// 注册监听套接字作为初始观察集合，最大描述符取监听套接字中的最大值
    pub fn new(mut listeners: Vec<TcpListener>, capacity: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut maxfd = -1;
        for (i, listener) in listeners.iter_mut().enumerate() {
            poll.registry()
                .register(listener, Token(LISTENER_TOKEN_BASE + i), Interest::READABLE)?;
            maxfd = maxfd.max(listener.as_raw_fd());
        }
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listeners,
            clients: SlotArena::with_capacity(capacity),
            maxfd,
            nready: 0,
            next_id: 0,
        })
    }

    /// 等待就绪事件，这是事件循环唯一的阻塞点
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Ready>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                self.nready = 0;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }
        let ready: Vec<Ready> = self
            .events
            .iter()
            .map(|event| match event.token() {
                Token(t) if t >= LISTENER_TOKEN_BASE => Ready::Listener(t - LISTENER_TOKEN_BASE),
                Token(slot) => Ready::Client(slot),
            })
            .collect();
        self.nready = ready.len();
        Ok(ready)
    }

    /// 接受一个等待中的连接，没有等待中的连接时返回 `None`
    pub fn accept_ready(&mut self, listener: usize) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let listener = match self.listeners.get(listener) {
            Some(l) => l,
            None => return Ok(None),
        };
        loop {
            match listener.accept() {
                Ok(accepted) => return Ok(Some(accepted)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// 把新连接放入连接池。
    ///
    /// 返回 `Ok(None)` 表示连接池已满，连接随即被丢弃（关闭）。
    pub fn admit(&mut self, stream: TcpStream) -> io::Result<Option<usize>> {
        self.nready = self.nready.saturating_sub(1);
        let id = self.next_id;
        self.next_id += 1;
        let fd = stream.as_raw_fd();

        let slot = match self.clients.insert(Connection::new(stream, id)) {
            Ok(slot) => slot,
            Err(_rejected) => {
                warn!("[ID{}]Error: too many clients.", id);
                return Ok(None);
            }
        };
        if let Some(conn) = self.clients.get_mut(slot) {
            if let Err(e) = self.poll.registry().register(
                conn.stream_mut(),
                Token(slot),
                Interest::READABLE | Interest::WRITABLE,
            ) {
                self.clients.remove(slot);
                return Err(e);
            }
        }
        self.maxfd = self.maxfd.max(fd);
        debug!("[ID{}]TCP连接已建立，槽位{}", id, slot);
        Ok(Some(slot))
    }

    /// 处理一个就绪的客户端连接
    pub fn service(&mut self, slot: usize, config: &Config) -> Disposition {
        let conn = match self.clients.get_mut(slot) {
            Some(conn) => conn,
            None => return Disposition::Keep,
        };
        self.nready = self.nready.saturating_sub(1);
        match conn.on_ready(config) {
            Ok(disposition) => disposition,
            Err(e) => {
                error!("[ID{}]连接出现传输错误：{}", conn.id(), e);
                Disposition::Retire
            }
        }
    }

    /// 关闭连接并清空其槽位，已满标志保持不变
    pub fn retire(&mut self, slot: usize) {
        if let Some(mut conn) = self.clients.remove(slot) {
            if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
                warn!("[ID{}]注销连接失败：{}", conn.id(), e);
            }
            if let Err(e) = conn.stream_mut().shutdown(Shutdown::Write) {
                debug!("[ID{}]关闭写端失败：{}", conn.id(), e);
            }
            conn.drain_input();
            debug!("[ID{}]连接已回收，槽位{}", conn.id(), slot);
        }
    }

    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.listeners.iter().map(|l| l.local_addr()).collect()
    }

    pub fn is_full(&self) -> bool {
        self.clients.is_full()
    }

    pub fn active_connections(&self) -> usize {
        self.clients.len()
    }

    pub fn high_water_mark(&self) -> Option<usize> {
        self.clients.high_water_mark()
    }

    pub fn maxfd(&self) -> RawFd {
        self.maxfd
    }

    pub fn nready(&self) -> usize {
        self.nready
    }
}
