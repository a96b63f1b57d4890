// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Liso 协议参数与常量模块
//!
//! 该模块定义了 Liso 服务器遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 服务器实际会产生的状态码及其原因短语（Reason Phrase）。
//! - 按匹配顺序排列的文件后缀到 MIME 类型映射表。
//! - HTTP 方法、版本的强类型枚举。

use lazy_static::lazy_static;
use std::collections::HashMap;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "Liso/1.0";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 单行（以及整个请求头块）允许的最大字节数
pub const MAX_LINE: usize = 8192;

/// 每个连接的读缓冲区容量
pub const RIO_BUFSIZE: usize = 8192;

/// 传统 `select` 可观察的描述符上限
pub const FD_SETSIZE: usize = 1024;

/// 连接池最多同时容纳的客户端数量，预留 5 个描述符给监听套接字与日志等
pub const MAX_CLIENTS: usize = FD_SETSIZE - 5;

/// 请求路径中包含该子串即视为动态内容（CGI）
pub const CGI_MARKER: &str = "cgi-bin";

/// 目录请求默认补全的文件名
pub const INDEX_FILE: &str = "index.html";

lazy_static! {
    /// HTTP 状态码与其对应的原因短语映射表。
    ///
    /// 只收录 Liso 实际会发出的状态码，短语与线上报文保持一致。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");
        map.insert(204, "No Content");
        map.insert(400, "Bad Request");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(411, "Length Required");
        map.insert(501, "Not Implemented");
        map.insert(505, "HTTP Version not supported");
        map
    };
}

/// 文件后缀到 MIME 类型的映射表。
///
/// 按子串包含关系逐项匹配，先匹配者优先，因此顺序即语义。
pub const MIME_TYPES: [(&str, &str); 6] = [
    (".html", "text/html"),
    (".css", "text/css"),
    (".js", "application/javascript"),
    (".png", "image/png"),
    (".gif", "image/gif"),
    (".jpg", "image/jpeg"),
];

/// 没有任何后缀命中时使用的兜底类型
pub const DEFAULT_MIME: &str = "text/plain";

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.1 版本
    V1_1,
}

/// Liso 接受的 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 获取资源的元数据（不包含响应体）
    Head,
    /// 提交数据；目标文件已存在时按 GET 处理
    Post,
}

impl HttpRequestMethod {
    /// 大小写不敏感地识别方法名，不在 GET/HEAD/POST 之内时返回 `None`
    pub fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("GET") {
            Some(HttpRequestMethod::Get)
        } else if token.eq_ignore_ascii_case("HEAD") {
            Some(HttpRequestMethod::Head)
        } else if token.eq_ignore_ascii_case("POST") {
            Some(HttpRequestMethod::Post)
        } else {
            None
        }
    }
}

impl HttpVersion {
    /// 只有 `HTTP/1.1`（大小写不敏感）被接受
    pub fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("HTTP/1.1") {
            Some(HttpVersion::V1_1)
        } else {
            None
        }
    }
}

use std::fmt;

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Post => write!(f, "POST"),
        }
    }
}
