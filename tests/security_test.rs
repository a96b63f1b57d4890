// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod security_tests {
    //! # 安全回归测试套件
    //!
    //! 用畸形或恶意的请求验证服务器的防御行为：
    //! - 路径遍历与动态内容请求
    //! - 超长报文
    //! - 按子串匹配请求头带来的行为
    //! - 慢速连接

    use std::fs;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::thread;
    use std::time::Duration;

    use liso::{Config, Server};
    use tempfile::TempDir;

    fn start() -> (TempDir, SocketAddr) {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("public");
        fs::create_dir(&public).unwrap();
        fs::write(public.join("index.html"), "public page").unwrap();
        fs::write(dir.path().join("secret.txt"), "top secret").unwrap();

        let config = Config::new()
            .with_www_root(public.to_str().unwrap())
            .with_ports(0, 0);
        let mut server = Server::bind(config).unwrap();
        let addr = server.local_addrs().unwrap()[0];
        thread::spawn(move || {
            let _ = server.run();
        });
        (dir, addr)
    }

    /// 发送请求并读取到服务端关闭或超时为止
    fn send_request(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(request).unwrap();
        let mut buffer = Vec::new();
        let _ = stream.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).to_string()
    }

    /// 从原始响应字符串中提取 HTTP 状态码
    fn extract_status_code(response: &str) -> u16 {
        response
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0)
    }

    /// ## 攻击向量：路径遍历
    /// 含 `..` 的路径一律拒绝，根目录之外的文件内容不能出现在响应中。
    #[test]
    fn test_path_traversal() {
        let (_dir, addr) = start();
        let attacks: [&[u8]; 3] = [
            b"GET /../secret.txt HTTP/1.1\r\nConnection: close\r\n\r\n",
            b"GET /sub/../../secret.txt HTTP/1.1\r\nConnection: close\r\n\r\n",
            b"HEAD /../../../../etc/passwd HTTP/1.1\r\nConnection: close\r\n\r\n",
        ];
        for attack in attacks {
            let response = send_request(addr, attack);
            assert_eq!(extract_status_code(&response), 403);
            assert!(!response.contains("top secret"));
        }
    }

    /// 百分号编码不做解码，按字面路径查找
    #[test]
    fn test_encoded_traversal_is_literal() {
        let (_dir, addr) = start();
        let response = send_request(
            addr,
            b"GET /%2e%2e/secret.txt HTTP/1.1\r\nConnection: close\r\n\r\n",
        );
        assert_eq!(extract_status_code(&response), 404);
        assert!(!response.contains("top secret"));
    }

    /// ## 动态内容
    /// 目标中出现 `cgi-bin` 即视为动态请求，直接拒绝而不执行任何程序。
    #[test]
    fn test_dynamic_content_is_forbidden() {
        let (_dir, addr) = start();
        let response = send_request(
            addr,
            b"GET /cgi-bin/adder?1&2 HTTP/1.1\r\nConnection: close\r\n\r\n",
        );
        assert_eq!(extract_status_code(&response), 403);
        assert!(response.contains("Forbidden"));
    }

    /// ## 超长报文
    #[test]
    fn test_oversized_header_line() {
        let (_dir, addr) = start();
        let mut request = b"GET / HTTP/1.1\r\nX-Large: ".to_vec();
        request.extend(std::iter::repeat(b'A').take(10000));
        request.extend_from_slice(b"\r\n\r\n");
        let response = send_request(addr, &request);
        assert_eq!(extract_status_code(&response), 400);
        assert!(response.contains("Connection: close"));
    }

    /// ## 请求头按整行子串匹配
    /// 值里出现 `Connection: close` 的其他头部同样会让连接在响应后关闭。
    #[test]
    fn test_connection_close_substring_match() {
        let (_dir, addr) = start();
        let response = send_request(
            addr,
            b"GET / HTTP/1.1\r\nX-Note: Connection: close\r\n\r\n",
        );
        assert_eq!(extract_status_code(&response), 200);
        assert!(response.contains("Connection: close\r\n"));
        assert!(response.ends_with("public page"));
    }

    /// 负数的 Content-Length 不会被当作请求体长度
    #[test]
    fn test_negative_content_length() {
        let (_dir, addr) = start();
        let response = send_request(
            addr,
            b"POST /index.html HTTP/1.1\r\nContent-Length: -5\r\nConnection: close\r\n\r\n",
        );
        assert_eq!(extract_status_code(&response), 200);
        assert!(response.ends_with("public page"));
    }

    /// ## 慢速连接
    /// 一直不发完请求头的客户端不会影响其他连接。
    #[test]
    fn test_slowloris_does_not_block() {
        let (_dir, addr) = start();
        let mut idle = Vec::new();
        for _ in 0..4 {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"GET / HTTP/1.1\r\nX-Slow: ").unwrap();
            idle.push(stream);
        }
        thread::sleep(Duration::from_millis(100));

        let response = send_request(addr, b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert_eq!(extract_status_code(&response), 200);
    }
}
