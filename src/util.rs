use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::exception::Exception;

pub struct HtmlBuilder {
    title: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_exception(exception: Exception) -> Self {
        let body = format!(
            "Error {} -- {}\r\n<br><p>{}</p>",
            exception.status_code(),
            exception.reason(),
            exception.explanation()
        );
        Self {
            title: "Liso Error".to_string(),
            body,
        }
    }

    pub fn build(&self) -> String {
        format!(
            "<html><title>{}</title><body>\r\n{}</body></html>\r\n",
            self.title, self.body
        )
    }
}

/// 按 RFC 7231 的 IMF-fixdate 格式输出，例如 `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn format_system_time(time: SystemTime) -> String {
    format_date(&DateTime::<Utc>::from(time))
}
