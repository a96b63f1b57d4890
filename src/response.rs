use crate::{
    exception::Exception,
    param::*,
    request::Request,
    util::{format_date, format_system_time, HtmlBuilder},
};

use bytes::{BufMut, Bytes, BytesMut};
use chrono::prelude::*;
use log::{debug, error, warn};

use std::{
    fs::{self, Metadata},
    path::Path,
};

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    date: DateTime<Utc>,
    server_name: String,
    /// 除 Date 与 Server 之外的头部，按发送顺序排列
    headers: Vec<(&'static str, String)>,
    content: Option<Bytes>,
}

impl Response {
    fn new(code: u16, connection_close: bool) -> Self {
        let mut response = Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
            headers: Vec::new(),
            content: None,
        };
        response.set_code(code);
        if connection_close {
            response.push_header("Connection", "close".to_string());
        }
        response
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
                "Unknown".to_string()
            }
        };
        self
    }

    fn push_header(&mut self, name: &'static str, value: String) -> &mut Self {
        self.headers.push((name, value));
        self
    }

    /// 错误响应：HTML 正文，头部依次为 Date、Server、可选的 Connection、Content-Type、Content-Length
    pub fn from_exception(exception: Exception, connection_close: bool) -> Self {
        let content = HtmlBuilder::from_exception(exception).build();
        let mut response = Self::new(exception.status_code(), connection_close);
        response
            .push_header("Content-Type", "text/html".to_string())
            .push_header("Content-Length", content.len().to_string());
        response.content = Some(Bytes::from(content));
        response
    }

    /// 根据请求方法分发，生成唯一的一个响应
    pub fn from_request(request: &Request, id: u128) -> Self {
        let close = request.connection_close();
        if request.is_dynamic() {
            warn!("[ID{}]不支持CGI，拒绝动态内容请求：{}", id, request.target());
            return Self::from_exception(Exception::Forbidden, close);
        }
        if request.escapes_root() {
            warn!("[ID{}]请求路径试图越出文档根目录：{}", id, request.target());
            return Self::from_exception(Exception::Forbidden, close);
        }
        let result = match request.method() {
            HttpRequestMethod::Get => serve_file(request.path(), close, false, id),
            HttpRequestMethod::Head => serve_file(request.path(), close, true, id),
            HttpRequestMethod::Post => serve_post(request.path(), close, id),
        };
        match result {
            Ok(response) => response,
            Err(e) => {
                warn!("[ID{}]{}：{}", id, e, request.path());
                Self::from_exception(e, close)
            }
        }
    }

    /// 状态行与头部块
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        header.push_str(&["Date: ", format_date(&self.date).as_str(), CRLF].concat());
        header.push_str(&["Server: ", self.server_name.as_str(), CRLF].concat());
        for (name, value) in &self.headers {
            header.push_str(&[*name, ": ", value.as_str(), CRLF].concat());
        }
        header.push_str(CRLF);
        header.into_bytes()
    }

    /// 先追加头部块，再追加正文，两者分开写入
    pub fn write_to(&self, out: &mut BytesMut) {
        out.put_slice(&self.header_bytes());
        if let Some(content) = &self.content {
            out.put_slice(content);
        }
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut out = BytesMut::new();
        self.write_to(&mut out);
        out.to_vec()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }
}

/// GET 与 HEAD：校验文件后发送 200 头部，GET 附带文件的全部字节
fn serve_file(path: &str, close: bool, headonly: bool, id: u128) -> Result<Response, Exception> {
    let metadata = validate_file(path)?;
    let content = match headonly {
        true => None,
        false => match fs::read(path) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                error!("[ID{}]无法读取文件{}。错误：{}", id, path, e);
                return Err(Exception::Forbidden);
            }
        },
    };

    let mut response = Response::new(200, close);
    response
        .push_header("Content-Length", metadata.len().to_string())
        .push_header("Content-Type", get_filetype(path).to_string());
    match metadata.modified() {
        Ok(time) => {
            response.push_header("Last-Modified", format_system_time(time));
        }
        Err(e) => warn!("[ID{}]无法获取文件{}的修改时间: {}", id, path, e),
    }
    response.content = content;
    debug!(
        "[ID{}]Content-Length: {}, headonly: {}",
        id,
        metadata.len(),
        headonly
    );
    Ok(response)
}

/// POST：目标已存在时等同于 GET，否则回复 204
fn serve_post(path: &str, close: bool, id: u128) -> Result<Response, Exception> {
    if fs::metadata(path).is_ok() {
        debug!("[ID{}]POST目标已存在，按GET处理", id);
        return serve_file(path, close, false, id);
    }
    let mut response = Response::new(204, close);
    response
        .push_header("Content-Length", "0".to_string())
        .push_header("Content-Type", "text/html".to_string());
    Ok(response)
}

/// 要求路径指向一个存在的、服务器身份可读的普通文件
pub fn validate_file(path: &str) -> Result<Metadata, Exception> {
    let file_path = Path::new(path);
    let metadata = fs::metadata(file_path).map_err(|_| Exception::FileNotFound)?;
    if !metadata.is_file() || !is_owner_readable(&metadata) {
        return Err(Exception::Forbidden);
    }
    Ok(metadata)
}

#[cfg(unix)]
fn is_owner_readable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o400 != 0
}

#[cfg(not(unix))]
fn is_owner_readable(_metadata: &Metadata) -> bool {
    true
}

/// 按后缀表的顺序做子串匹配，先命中者优先
pub fn get_filetype(filename: &str) -> &'static str {
    MIME_TYPES
        .iter()
        .find(|(suffix, _)| filename.contains(suffix))
        .map_or(DEFAULT_MIME, |(_, mime)| *mime)
}
