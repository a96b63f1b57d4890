// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 单个客户端连接
//!
//! 一个 `Connection` 独占一个 [`LineReader`]（以及其中的套接字）、一份解析状态和一个待发送缓冲区。
//! 连接就绪时先尽量把待发送数据写出，再驱动解析状态机直到底层返回 `WouldBlock`。

use std::io::{self, ErrorKind, Read, Write};

use bytes::{Buf, BytesMut};
use log::{debug, info};

use crate::{
    config::Config,
    request::{Progress, RequestParser},
    response::Response,
    rio::LineReader,
};

/// 一次就绪处理之后连接的去留
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Disposition {
    Keep,
    Retire,
}

pub struct Connection<S> {
    id: u128,
    reader: LineReader<S>,
    parser: RequestParser,
    outbound: BytesMut,
    close_after_flush: bool,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, id: u128) -> Self {
        Self {
            id,
            reader: LineReader::new(stream),
            parser: RequestParser::new(id),
            outbound: BytesMut::new(),
            close_after_flush: false,
        }
    }

    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn stream_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// 尚未写出的响应字节数
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    /// 处理一次就绪通知。
    ///
    /// 待发送数据没有写完时不会读取新的请求；返回 `Err` 表示传输层错误，调用方应回收连接。
    pub fn on_ready(&mut self, config: &Config) -> io::Result<Disposition> {
        loop {
            if !self.flush()? {
                return Ok(Disposition::Keep);
            }
            if self.close_after_flush {
                debug!("[ID{}]响应已发送完毕，关闭连接", self.id);
                return Ok(Disposition::Retire);
            }
            match self.parser.advance(&mut self.reader, config)? {
                Progress::Pending => return Ok(Disposition::Keep),
                Progress::Closed => {
                    debug!("[ID{}]客户端关闭了连接", self.id);
                    return Ok(Disposition::Retire);
                }
                Progress::Ready(request) => {
                    let response = Response::from_request(&request, self.id);
                    info!(
                        "[ID{}] {}, {}, {}, {}",
                        self.id,
                        request.method(),
                        request.target(),
                        response.status_code(),
                        response.information(),
                    );
                    response.write_to(&mut self.outbound);
                    if request.connection_close() || self.reader.is_eof() {
                        self.close_after_flush = true;
                    }
                }
                Progress::Rejected {
                    error,
                    connection_close,
                } => {
                    info!("[ID{}]请求被拒绝：{}", self.id, error);
                    Response::from_exception(error, connection_close).write_to(&mut self.outbound);
                    if connection_close {
                        self.close_after_flush = true;
                    }
                }
            }
        }
    }

    /// 把待发送缓冲区写入套接字，全部写完返回 `true`，遇到 `WouldBlock` 返回 `false`。
    fn flush(&mut self) -> io::Result<bool> {
        while !self.outbound.is_empty() {
            match self.reader.get_mut().write(&self.outbound) {
                Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
                Ok(n) => self.outbound.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// 关闭前读掉内核中残留的请求字节，避免关闭时发出 RST 冲掉尚未被客户端读取的响应
    pub fn drain_input(&mut self) {
        let mut scratch = [0u8; 4096];
        let stream = self.reader.get_mut();
        for _ in 0..16 {
            match stream.read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}
