// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块负责从连接的 [`LineReader`] 中逐行读取数据，构建强类型的 [`Request`]。
//! 解析过程是一个可以随时挂起、随时恢复的状态机：
//! 1. 请求行（Request-Line）的解析（方法、路径、版本）及校验。
//! 2. 请求路径到文件系统路径的映射，动态内容（CGI）参数的拆分。
//! 3. 请求头（Headers）的逐行扫描，提取 Host 端口、`Connection: close` 与 `Content-Length`。
//! 4. 按 `Content-Length` 丢弃请求体，避免其被误认为下一个请求。
//!
//! 底层读取返回 `WouldBlock` 时，已读到的半行和已解析的字段都保存在状态中，
//! 下次连接就绪时从断点继续。

use std::io::{self, ErrorKind, Read};
use std::mem;
use std::path::{Component, Path};

use log::{debug, info, warn};

use crate::{config::Config, exception::Exception, param::*, rio::LineReader};

/// 表示一个完整的 HTTP 请求上下文。
///
/// 每个请求新建一个，响应发送完毕后即丢弃。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 原始请求路径（包含查询字符串）
    target: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 映射后的文件系统路径
    path: String,
    /// CGI 参数，仅当请求路径指向动态内容时存在
    cgi_args: Option<String>,
    /// 声明的请求体长度，-1 表示没有 `Content-Length` 头
    content_length: i64,
    /// Host 头中的端口等于配置的安全端口
    is_secure: bool,
    /// 响应发送后需要关闭连接
    connection_close: bool,
}

impl Request {
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn cgi_args(&self) -> Option<&str> {
        self.cgi_args.as_deref()
    }

    /// 请求路径是否指向动态内容
    pub fn is_dynamic(&self) -> bool {
        self.cgi_args.is_some()
    }

    /// 请求路径中含有 `..`，映射后可能落在文档根目录之外
    pub fn escapes_root(&self) -> bool {
        Path::new(&self.target)
            .components()
            .any(|c| c == Component::ParentDir)
    }

    pub fn content_length(&self) -> i64 {
        self.content_length
    }

    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    pub fn connection_close(&self) -> bool {
        self.connection_close
    }
}

/// 解析状态机的一次推进结果
#[derive(Debug)]
pub enum Progress {
    /// 数据尚未到齐，等待下一次就绪通知
    Pending,
    /// 在读到任何请求字节之前流已结束
    Closed,
    /// 请求已完整解析，可以分发
    Ready(Request),
    /// 协议错误，需要回复错误响应
    Rejected {
        error: Exception,
        connection_close: bool,
    },
}

impl Progress {
    /// 关闭与否由错误类型决定，见 [`Exception::forces_close`]
    fn rejected(error: Exception) -> Self {
        Progress::Rejected {
            connection_close: error.forces_close(),
            error,
        }
    }
}

#[derive(Debug)]
enum ParseState {
    RequestLine {
        partial: Vec<u8>,
    },
    Headers {
        request: Request,
        partial: Vec<u8>,
        header_bytes: usize,
        has_content_length: bool,
    },
    Body {
        request: Request,
        remaining: u64,
    },
}

impl Default for ParseState {
    fn default() -> Self {
        ParseState::RequestLine {
            partial: Vec::new(),
        }
    }
}

pub struct RequestParser {
    id: u128,
    state: ParseState,
}

impl RequestParser {
    pub fn new(id: u128) -> Self {
        Self {
            id,
            state: ParseState::default(),
        }
    }

    /// 尚未读到下一个请求的任何字节
    pub fn is_idle(&self) -> bool {
        matches!(&self.state, ParseState::RequestLine { partial } if partial.is_empty())
    }

    /// 尽可能地推进解析，直到得到结果或者底层流返回 `WouldBlock`。
    ///
    /// 得到 `Ready`、`Rejected` 或 `Closed` 后状态机回到初始状态，可以直接解析下一个请求。
    /// 只有读取请求行时的传输错误会以 `Err` 返回。
    pub fn advance<R: Read>(
        &mut self,
        reader: &mut LineReader<R>,
        config: &Config,
    ) -> io::Result<Progress> {
        let id = self.id;
        loop {
            match &mut self.state {
                ParseState::RequestLine { partial } => {
                    match reader.read_line(partial, MAX_LINE) {
                        Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Progress::Pending),
                        Err(e) => {
                            self.state = ParseState::default();
                            return Err(e);
                        }
                        Ok(0) => return Ok(Progress::Closed),
                        Ok(_) => {}
                    }
                    let line = mem::take(partial);
                    let truncated = !line.ends_with(b"\n") && !reader.is_eof();
                    match parse_request_line(&line, truncated, config, id) {
                        Ok(request) => {
                            self.state = ParseState::Headers {
                                request,
                                partial: Vec::new(),
                                header_bytes: 0,
                                has_content_length: false,
                            };
                        }
                        Err(error) => return Ok(Progress::rejected(error)),
                    }
                }
                ParseState::Headers {
                    request,
                    partial,
                    header_bytes,
                    has_content_length,
                } => {
                    let ended = match reader.read_line(partial, MAX_LINE) {
                        Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Progress::Pending),
                        Err(e) => {
                            warn!("[ID{}]读取请求头时遇到错误：{}，按请求结束处理", id, e);
                            request.connection_close = true;
                            true
                        }
                        Ok(0) => {
                            debug!("[ID{}]请求头未结束时连接已关闭", id);
                            request.connection_close = true;
                            true
                        }
                        Ok(n) => {
                            *header_bytes += n;
                            if *header_bytes > MAX_LINE {
                                warn!("[ID{}]请求头超过{}字节，拒绝请求", id, MAX_LINE);
                                self.state = ParseState::default();
                                return Ok(Progress::rejected(Exception::HeaderTooLarge));
                            }
                            let line = mem::take(partial);
                            if line == b"\r\n" || line == b"\n" {
                                true
                            } else {
                                inspect_header(&line, request, has_content_length, config, id);
                                false
                            }
                        }
                    };
                    if !ended {
                        continue;
                    }

                    let state = mem::take(&mut self.state);
                    if let ParseState::Headers {
                        request,
                        has_content_length,
                        ..
                    } = state
                    {
                        if request.method == HttpRequestMethod::Post && !has_content_length {
                            warn!("[ID{}]POST请求缺少Content-Length", id);
                            return Ok(Progress::rejected(Exception::LengthRequired));
                        }
                        if request.content_length > 0 && !reader.is_eof() {
                            self.state = ParseState::Body {
                                remaining: request.content_length as u64,
                                request,
                            };
                            continue;
                        }
                        return Ok(Progress::Ready(request));
                    }
                }
                ParseState::Body { request, remaining } => {
                    let mut sink = Vec::new();
                    while *remaining > 0 {
                        sink.clear();
                        let want = (*remaining).min(RIO_BUFSIZE as u64) as usize;
                        match reader.read_bytes(&mut sink, want) {
                            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                                return Ok(Progress::Pending)
                            }
                            Err(e) => {
                                warn!("[ID{}]读取请求体时遇到错误：{}", id, e);
                                request.connection_close = true;
                                break;
                            }
                            Ok(0) => {
                                debug!("[ID{}]请求体未读完时连接已关闭", id);
                                request.connection_close = true;
                                break;
                            }
                            Ok(n) => *remaining -= n as u64,
                        }
                    }
                    debug!("[ID{}]请求体已丢弃", id);
                    if let ParseState::Body { request, .. } = mem::take(&mut self.state) {
                        return Ok(Progress::Ready(request));
                    }
                }
            }
        }
    }
}

/// 解析请求行，校验方法与版本，并完成路径映射。
fn parse_request_line(
    line: &[u8],
    truncated: bool,
    config: &Config,
    id: u128,
) -> Result<Request, Exception> {
    if truncated {
        warn!("[ID{}]请求行超过{}字节，拒绝请求", id, MAX_LINE);
        return Err(Exception::BadRequest);
    }
    let text = match std::str::from_utf8(line) {
        Ok(t) => t,
        Err(_) => {
            warn!("[ID{}]请求行不是合法的UTF-8", id);
            return Err(Exception::BadRequest);
        }
    };
    let parts: Vec<&str> = text.split_ascii_whitespace().take(3).collect();
    if parts.len() < 3 {
        info!("[ID{}]HTTP请求行格式不正确：'{}'", id, text.trim_end());
        return Err(Exception::BadRequest);
    }
    info!(
        "[ID{}]Request: method={}, uri={}, version={}",
        id, parts[0], parts[1], parts[2]
    );

    let method = match HttpRequestMethod::parse(parts[0]) {
        Some(m) => m,
        None => {
            warn!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
            return Err(Exception::NotImplemented);
        }
    };
    let version = match HttpVersion::parse(parts[2]) {
        Some(v) => v,
        None => {
            warn!("[ID{}]不支持的HTTP协议版本：{}", id, parts[2]);
            return Err(Exception::UnsupportedHttpVersion);
        }
    };

    let target = parts[1].to_string();
    let (path, cgi_args) = resolve_target(config.www_root(), &target);
    debug!("[ID{}]映射物理路径：{}", id, path);

    Ok(Request {
        method,
        target,
        version,
        path,
        cgi_args,
        content_length: -1,
        is_secure: false,
        connection_close: false,
    })
}

/// 把请求路径映射为文件系统路径。
///
/// 不含 `cgi-bin` 的路径视为静态内容，直接拼接在文档根目录之后，以 `/` 结尾时补上 `index.html`；
/// 否则视为动态内容，第一个 `?` 之后的部分作为 CGI 参数（没有 `?` 时为空串）。
pub fn resolve_target(www_root: &str, target: &str) -> (String, Option<String>) {
    if !target.contains(CGI_MARKER) {
        let mut path = [www_root, target].concat();
        if target.ends_with('/') {
            path.push_str(INDEX_FILE);
        }
        return (path, None);
    }
    let (nominal, args) = match target.split_once('?') {
        Some((nominal, args)) => (nominal, args),
        None => (target, ""),
    };
    ([www_root, nominal].concat(), Some(args.to_string()))
}

/// 按子串匹配检查单个请求头，命中则更新请求上下文。
///
/// 匹配的是整行而不是字段名，值里恰好出现 `Host:` 或 `Content-Length` 的行同样会被识别。
fn inspect_header(
    line: &[u8],
    request: &mut Request,
    has_content_length: &mut bool,
    config: &Config,
    id: u128,
) {
    let line = String::from_utf8_lossy(line);

    if let Some(index) = line.find("Host:") {
        let value = line[index + "Host:".len()..].trim();
        if let Some((_, port)) = value.rsplit_once(':') {
            if leading_integer(port) == i64::from(config.https_port()) {
                request.is_secure = true;
                info!("[ID{}]Secure connection", id);
            }
        }
    }

    if line.contains("Connection: close") {
        request.connection_close = true;
    }

    if line.contains("Content-Length") {
        *has_content_length = true;
        request.content_length = line
            .split_ascii_whitespace()
            .nth(1)
            .map_or(0, leading_integer);
        debug!("[ID{}]content-length={}", id, request.content_length);
    }
}

/// 按十进制解析开头的整数部分（可带正负号），没有数字时得到 0。
fn leading_integer(text: &str) -> i64 {
    let text = text.trim_start();
    let (sign, digits) = match text.as_bytes().first() {
        Some(b'-') => (-1, &text[1..]),
        Some(b'+') => (1, &text[1..]),
        _ => (1, text),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    sign * value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rio::tests::Script;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn config() -> Config {
        Config::new().with_www_root("/srv/www").with_ports(8080, 8443)
    }

    fn parse(raw: &[u8]) -> Progress {
        let mut reader = LineReader::new(Cursor::new(raw.to_vec()));
        RequestParser::new(0).advance(&mut reader, &config()).unwrap()
    }

    fn expect_ready(raw: &[u8]) -> Request {
        match parse(raw) {
            Progress::Ready(request) => request,
            other => panic!("Expected Ready, got {:?}", other),
        }
    }

    fn expect_rejected(raw: &[u8]) -> (Exception, bool) {
        match parse(raw) {
            Progress::Rejected {
                error,
                connection_close,
            } => (error, connection_close),
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_get_request() {
        let request = expect_ready(b"GET /index.html HTTP/1.1\r\nHost: localhost:8080\r\n\r\n");
        assert_eq!(request.method(), HttpRequestMethod::Get);
        assert_eq!(request.target(), "/index.html");
        assert_eq!(request.version(), HttpVersion::V1_1);
        assert_eq!(request.path(), "/srv/www/index.html");
        assert_eq!(request.content_length(), -1);
        assert!(!request.is_secure());
        assert!(!request.connection_close());
        assert!(!request.is_dynamic());
    }

    #[test]
    fn test_root_resolves_to_index() {
        let request = expect_ready(b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(request.path(), "/srv/www/index.html");
    }

    #[test]
    fn test_lowercase_method_and_version() {
        let request = expect_ready(b"head /a.css http/1.1\r\n\r\n");
        assert_eq!(request.method(), HttpRequestMethod::Head);
    }

    #[test]
    fn test_too_few_tokens() {
        assert_eq!(expect_rejected(b"GET /\r\n\r\n"), (Exception::BadRequest, true));
        assert_eq!(expect_rejected(b"\r\n"), (Exception::BadRequest, true));
    }

    #[test]
    fn test_unsupported_method() {
        assert_eq!(
            expect_rejected(b"PUT /x HTTP/1.1\r\n\r\n"),
            (Exception::NotImplemented, true)
        );
    }

    #[test]
    fn test_unsupported_version() {
        assert_eq!(
            expect_rejected(b"GET / HTTP/1.0\r\n\r\n"),
            (Exception::UnsupportedHttpVersion, true)
        );
    }

    #[test]
    fn test_method_checked_before_version() {
        let (error, _) = expect_rejected(b"DELETE / HTTP/1.0\r\n\r\n");
        assert_eq!(error, Exception::NotImplemented);
    }

    #[test]
    fn test_post_without_content_length() {
        assert_eq!(
            expect_rejected(b"POST /form HTTP/1.1\r\nHost: localhost\r\n\r\n"),
            (Exception::LengthRequired, true)
        );
    }

    #[test]
    fn test_post_body_is_drained() {
        let raw = b"POST /form HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET / HTTP/1.1\r\n\r\n";
        let mut reader = LineReader::new(Cursor::new(raw.to_vec()));
        let mut parser = RequestParser::new(0);
        match parser.advance(&mut reader, &config()).unwrap() {
            Progress::Ready(request) => {
                assert_eq!(request.method(), HttpRequestMethod::Post);
                assert_eq!(request.content_length(), 5);
            }
            other => panic!("Expected Ready, got {:?}", other),
        }
        assert!(parser.is_idle());
        match parser.advance(&mut reader, &config()).unwrap() {
            Progress::Ready(request) => assert_eq!(request.method(), HttpRequestMethod::Get),
            other => panic!("Expected Ready, got {:?}", other),
        }
        assert!(matches!(
            parser.advance(&mut reader, &config()).unwrap(),
            Progress::Closed
        ));
    }

    #[test]
    fn test_connection_close_header() {
        let request = expect_ready(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(request.connection_close());
        // 大小写敏感
        let request = expect_ready(b"GET / HTTP/1.1\r\nconnection: Close\r\n\r\n");
        assert!(!request.connection_close());
    }

    #[test]
    fn test_secure_port_in_host() {
        let request = expect_ready(b"GET / HTTP/1.1\r\nHost: localhost:8443\r\n\r\n");
        assert!(request.is_secure());
        let request = expect_ready(b"GET / HTTP/1.1\r\nHost: localhost:8080\r\n\r\n");
        assert!(!request.is_secure());
        let request = expect_ready(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert!(!request.is_secure());
    }

    #[test]
    fn test_non_numeric_content_length_is_zero() {
        let request = expect_ready(b"POST /x HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        assert_eq!(request.content_length(), 0);
    }

    /// 请求头按整行子串匹配：值中出现的字段名同样会被识别
    #[test]
    fn test_substring_header_matching_is_preserved() {
        let request = expect_ready(b"GET / HTTP/1.1\r\nX-Note: Host: evil:8443\r\n\r\n");
        assert!(request.is_secure());
        let request =
            expect_ready(b"GET / HTTP/1.1\r\nX-Content-Length-Hint: 7\r\n\r\n");
        assert_eq!(request.content_length(), 7);
    }

    #[test]
    fn test_dynamic_target() {
        let request = expect_ready(b"GET /cgi-bin/run.py?a=1&b=2 HTTP/1.1\r\n\r\n");
        assert!(request.is_dynamic());
        assert_eq!(request.cgi_args(), Some("a=1&b=2"));
        assert_eq!(request.path(), "/srv/www/cgi-bin/run.py");
        assert_eq!(request.target(), "/cgi-bin/run.py?a=1&b=2");

        let request = expect_ready(b"GET /cgi-bin/ HTTP/1.1\r\n\r\n");
        assert_eq!(request.cgi_args(), Some(""));
        assert_eq!(request.path(), "/srv/www/cgi-bin/");
    }

    #[test]
    fn test_eof_during_headers_ends_request() {
        let request = expect_ready(b"GET /a.html HTTP/1.1\r\nHost: localhost\r\n");
        assert_eq!(request.path(), "/srv/www/a.html");
        assert!(request.connection_close());
    }

    #[test]
    fn test_eof_before_request() {
        assert!(matches!(parse(b""), Progress::Closed));
    }

    #[test]
    fn test_request_line_too_long() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_LINE));
        raw.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        assert_eq!(expect_rejected(&raw), (Exception::BadRequest, true));
    }

    fn request_line_of_len(len: usize) -> Vec<u8> {
        let fixed = "GET /".len() + " HTTP/1.1\r\n".len();
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat(b'a').take(len - fixed));
        raw.extend_from_slice(b" HTTP/1.1\r\n");
        assert_eq!(raw.len(), len);
        raw.extend_from_slice(b"\r\n");
        raw
    }

    #[test]
    fn test_request_line_length_boundary() {
        let request = expect_ready(&request_line_of_len(MAX_LINE - 1));
        assert_eq!(request.target().len(), MAX_LINE - 1 - " HTTP/1.1\r\nGET ".len());

        assert_eq!(
            expect_rejected(&request_line_of_len(MAX_LINE)),
            (Exception::BadRequest, true)
        );
    }

    #[test]
    fn test_rejection_close_follows_error_kind() {
        let cases: [&[u8]; 4] = [
            b"GET\r\n\r\n",
            b"PUT /x HTTP/1.1\r\n\r\n",
            b"GET / HTTP/2.0\r\n\r\n",
            b"POST /form HTTP/1.1\r\n\r\n",
        ];
        for raw in cases {
            let (error, close) = expect_rejected(raw);
            assert_eq!(close, error.forces_close());
        }
    }

    #[test]
    fn test_escapes_root() {
        assert!(expect_ready(b"GET /../etc/passwd HTTP/1.1\r\n\r\n").escapes_root());
        assert!(expect_ready(b"GET /a/../../b HTTP/1.1\r\n\r\n").escapes_root());
        assert!(!expect_ready(b"GET /a..b/c.html HTTP/1.1\r\n\r\n").escapes_root());
        assert!(!expect_ready(b"GET / HTTP/1.1\r\n\r\n").escapes_root());
    }

    #[test]
    fn test_headers_too_long() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..200 {
            raw.extend_from_slice(format!("X-Filler-{}: {}\r\n", i, "v".repeat(40)).as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        assert_eq!(expect_rejected(&raw), (Exception::HeaderTooLarge, true));
    }

    #[test]
    fn test_resume_across_would_block() {
        let raw = b"GET /slow.html HTTP/1.1\r\nHost: localhost:8443\r\nConnection: close\r\n\r\n";
        let mut reader = LineReader::new(Script::new().trickle(raw));
        let mut parser = RequestParser::new(7);
        let mut pending = 0;
        let request = loop {
            match parser.advance(&mut reader, &config()).unwrap() {
                Progress::Pending => pending += 1,
                Progress::Ready(request) => break request,
                other => panic!("Unexpected {:?}", other),
            }
        };
        assert_eq!(pending, raw.len() - 1);
        assert_eq!(request.path(), "/srv/www/slow.html");
        assert!(request.is_secure());
        assert!(request.connection_close());
    }

    #[test]
    fn test_transport_error_on_request_line() {
        let mut reader = LineReader::new(Script::new().error(ErrorKind::ConnectionReset));
        let err = RequestParser::new(0)
            .advance(&mut reader, &config())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_leading_integer() {
        assert_eq!(leading_integer("42"), 42);
        assert_eq!(leading_integer("  17abc"), 17);
        assert_eq!(leading_integer("-3"), -3);
        assert_eq!(leading_integer("abc"), 0);
        assert_eq!(leading_integer(""), 0);
    }

    proptest! {
        #[test]
        fn prop_unknown_methods_are_not_implemented(method in "[A-Z]{1,10}") {
            prop_assume!(HttpRequestMethod::parse(&method).is_none());
            let raw = format!("{} /x HTTP/1.1\r\n\r\n", method);
            let (error, close) = expect_rejected(raw.as_bytes());
            prop_assert_eq!(error, Exception::NotImplemented);
            prop_assert!(close);
        }

        #[test]
        fn prop_other_versions_are_rejected(version in "HTTP/[0-9]\\.[0-9]") {
            prop_assume!(version != "HTTP/1.1");
            let raw = format!("GET / {}\r\n\r\n", version);
            let (error, _) = expect_rejected(raw.as_bytes());
            prop_assert_eq!(error, Exception::UnsupportedHttpVersion);
        }

        #[test]
        fn prop_static_targets_concatenate(target in "/[a-z]{0,8}(/[a-z]{1,8}){0,3}/?") {
            let (path, args) = resolve_target("/root", &target);
            prop_assert!(args.is_none());
            if target.ends_with('/') {
                prop_assert_eq!(path, format!("/root{}index.html", target));
            } else {
                prop_assert_eq!(path, format!("/root{}", target));
            }
        }
    }
}
