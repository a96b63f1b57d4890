// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了 Liso 在请求处理生命周期中可能抛出的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖协议解析错误（请求行、方法、版本、头部）与文件校验错误。
//! - **语义映射**：每个变体都唯一对应一个 HTTP 状态码以及一对短/长描述文本，
//!   错误响应器直接据此生成响应。
//! - 传输层错误（accept/read/write 失败）不在此列，它们以 `std::io::Error` 的形式传播，
//!   由事件循环记录日志并回收连接。

use std::fmt;

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Exception {
    /// 请求行无法拆分出方法、路径、版本三个字段，或请求行超长。
    BadRequest,
    /// 请求头累计字节数超过单行上限。同样对应 `400 Bad Request`。
    HeaderTooLarge,
    /// 客户端使用了 GET/HEAD/POST 以外的方法。
    NotImplemented,
    /// 客户端使用了 `HTTP/1.1` 以外的协议版本。
    UnsupportedHttpVersion,
    /// POST 请求缺少 `Content-Length` 头。
    LengthRequired,
    /// 在文档根目录下未找到所请求的文件。
    FileNotFound,
    /// 文件存在但不是普通文件、不可读，或路径越权。
    Forbidden,
}

use Exception::*;

impl Exception {
    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            BadRequest | HeaderTooLarge => 400,
            Forbidden => 403,
            FileNotFound => 404,
            LengthRequired => 411,
            NotImplemented => 501,
            UnsupportedHttpVersion => 505,
        }
    }

    /// 状态行中的短描述
    pub fn reason(&self) -> &'static str {
        match self {
            BadRequest | HeaderTooLarge => "Bad Request",
            Forbidden => "Forbidden",
            FileNotFound => "Not Found",
            LengthRequired => "Length Required",
            NotImplemented => "Not Implemented",
            UnsupportedHttpVersion => "HTTP Version not supported",
        }
    }

    /// 错误页面正文中的长描述
    pub fn explanation(&self) -> &'static str {
        match self {
            BadRequest => "The request is not understood by the server",
            HeaderTooLarge => "Request header too long.",
            Forbidden => "Server couldn't read this file",
            FileNotFound => "Server couldn't find this file",
            LengthRequired => "Content-Length is required.",
            NotImplemented => "The method is not valid or not implemented by the server",
            UnsupportedHttpVersion => "Only HTTP/1.1 is supported by Liso server",
        }
    }

    /// 协议错误一律要求关闭连接；文件校验错误则沿用请求自身的关闭标志。
    pub fn forces_close(&self) -> bool {
        !matches!(self, FileNotFound | Forbidden)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.status_code(), self.reason(), self.explanation())
    }
}
