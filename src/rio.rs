// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 带缓冲的行读取器
//!
//! 把原始字节流包装成面向行的读取接口，并在多次调用之间保留尚未消费的字节。
//!
//! 底层流既可以是阻塞的，也可以是非阻塞的。对于非阻塞流，`WouldBlock` 会原样
//! 返回给调用方：`read_line` 已经读到的半行保存在调用方传入的 `Vec` 中，
//! 下次就绪时带着同一个 `Vec` 再调用即可从断点继续。

use std::io::{self, ErrorKind, Read};

use crate::param::RIO_BUFSIZE;

pub struct LineReader<R> {
    inner: R,
    buf: Box<[u8; RIO_BUFSIZE]>,
    /// 下一个未读字节在 `buf` 中的位置
    pos: usize,
    /// `buf` 中尚未读出的字节数，`pos + cnt <= RIO_BUFSIZE`
    cnt: usize,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Box::new([0; RIO_BUFSIZE]),
            pos: 0,
            cnt: 0,
            eof: false,
        }
    }

    /// 缓冲区为空时恰好调用一次底层 `read`。
    ///
    /// 被信号打断（`Interrupted`）时重试，其余错误（包括 `WouldBlock`）直接返回。
    /// 返回 0 表示流已结束。
    fn fill(&mut self) -> io::Result<usize> {
        debug_assert_eq!(self.cnt, 0);
        loop {
            match self.inner.read(&mut self.buf[..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.pos = 0;
                    self.cnt = n;
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// 读取一行（包含结尾的 `\n`），追加到 `line` 末尾。
    ///
    /// `line` 中已有的字节视为上一次被 `WouldBlock` 打断时读到的半行。
    /// 最多让 `line` 增长到 `max_len - 1` 字节，达到上限时即使没有换行符也返回。
    ///
    /// 返回 `line` 的当前长度：
    /// - 以 `\n` 结尾：完整的一行；
    /// - 为 0：读到任何字节之前流就结束了；
    /// - 非 0 且不以 `\n` 结尾：行被流结束（见 [`is_eof`](Self::is_eof)）或长度上限截断。
    pub fn read_line(&mut self, line: &mut Vec<u8>, max_len: usize) -> io::Result<usize> {
        let limit = max_len.saturating_sub(1);
        if line.last() == Some(&b'\n') {
            return Ok(line.len());
        }
        while line.len() < limit {
            if self.cnt == 0 && self.fill()? == 0 {
                break;
            }
            let window = self.cnt.min(limit - line.len());
            let chunk = &self.buf[self.pos..self.pos + window];
            let (take, done) = match chunk.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (window, false),
            };
            line.extend_from_slice(&chunk[..take]);
            self.pos += take;
            self.cnt -= take;
            if done {
                break;
            }
        }
        Ok(line.len())
    }

    /// 读出至多 `n` 个原始字节追加到 `out`，返回实际读出的字节数。
    ///
    /// 已经读出部分字节后遇到 `WouldBlock` 时返回已读数量而不是错误，
    /// 因此调用方只需累计返回值即可。返回 0 且 [`is_eof`](Self::is_eof) 为真表示流已结束。
    pub fn read_bytes(&mut self, out: &mut Vec<u8>, n: usize) -> io::Result<usize> {
        let mut taken = 0;
        while taken < n {
            if self.cnt == 0 {
                match self.fill() {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::WouldBlock && taken > 0 => break,
                    Err(e) => return Err(e),
                }
            }
            let take = self.cnt.min(n - taken);
            out.extend_from_slice(&self.buf[self.pos..self.pos + take]);
            self.pos += take;
            self.cnt -= take;
            taken += take;
        }
        Ok(taken)
    }

    /// 缓冲区中尚未读出的字节数
    pub fn buffered(&self) -> usize {
        self.cnt
    }

    /// 底层流是否已经报告过结束
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}
