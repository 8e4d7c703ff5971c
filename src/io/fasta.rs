use anyhow::Result;
use std::io::BufRead;

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

/// 逐条读取 FASTA 记录。序列行中的空白被丢弃，小写字母转为大写。
pub struct FastaReader<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
    peek_header: Option<String>,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            done: false,
            peek_header: None,
        }
    }

    /// 读取下一条记录的头部，文件结束时返回 `None`。
    fn next_header(&mut self) -> Result<Option<String>> {
        if let Some(h) = self.peek_header.take() {
            return Ok(Some(h));
        }
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                self.done = true;
                return Ok(None);
            }
            if let Some(rest) = self.buf.strip_prefix('>') {
                return Ok(Some(rest.trim().to_string()));
            }
        }
    }

    /// 读取序列行直到下一个头部；`keep` 为 false 时只跳过不保存。
    fn read_body(&mut self, keep: bool) -> Result<Vec<u8>> {
        let mut seq: Vec<u8> = Vec::new();
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                self.done = true;
                break;
            }
            if let Some(rest) = self.buf.strip_prefix('>') {
                self.peek_header = Some(rest.trim().to_string());
                break;
            }
            if keep {
                seq.extend(
                    self.buf
                        .bytes()
                        .filter(|b| !b.is_ascii_whitespace())
                        .map(|b| b.to_ascii_uppercase()),
                );
            }
        }
        Ok(seq)
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        if self.done {
            return Ok(None);
        }
        let Some(header) = self.next_header()? else {
            return Ok(None);
        };

        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("").to_string();
        let desc = parts
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let seq = self.read_body(true)?;
        Ok(Some(FastaRecord { id, desc, seq }))
    }

    /// 找到 id（头部第一个空白前的部分）为 `name` 的记录；
    /// 其余记录的序列不会被缓存。
    pub fn find_sequence(&mut self, name: &str) -> Result<Option<FastaRecord>> {
        while !self.done {
            let Some(header) = self.next_header()? else {
                break;
            };
            let id = header.split_whitespace().next().unwrap_or("");
            if id != name {
                self.read_body(false)?;
                continue;
            }
            let desc = header[id.len()..].trim();
            let desc = (!desc.is_empty()).then(|| desc.to_string());
            let id = id.to_string();
            let seq = self.read_body(true)?;
            return Ok(Some(FastaRecord { id, desc, seq }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_simple_fasta() {
        let data = b">chr1 first\nACgTNN\n>chr2\nAAA\n";
        let cursor = Cursor::new(&data[..]);
        let mut r = FastaReader::new(cursor);

        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.desc.as_deref(), Some("first"));
        assert_eq!(r1.seq, b"ACGTNN");

        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.id, "chr2");
        assert_eq!(r2.desc, None);
        assert_eq!(r2.seq, b"AAA");

        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn parse_fasta_with_crlf_and_whitespace() {
        let data = b">chr1 desc\r\nAC g t n\r\n acgt\r\n>chr2 \r\n N N N \r\n";
        let cursor = Cursor::new(&data[..]);
        let mut r = FastaReader::new(cursor);

        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.seq, b"ACGTNACGT");

        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.id, "chr2");
        assert_eq!(r2.desc, None);
        assert_eq!(r2.seq, b"NNN");

        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn find_named_sequence() {
        let data = b">chr1 first\nAAAA\n>chr2 second one\nCC\ngg\n>chr3\nTT\n";
        let mut r = FastaReader::new(Cursor::new(&data[..]));
        let rec = r.find_sequence("chr2").unwrap().unwrap();
        assert_eq!(rec.id, "chr2");
        assert_eq!(rec.desc.as_deref(), Some("second one"));
        assert_eq!(rec.seq, b"CCGG");

        let mut r = FastaReader::new(Cursor::new(&data[..]));
        assert!(r.find_sequence("chr9").unwrap().is_none());

        // 只匹配第一个空白前的 id
        let mut r = FastaReader::new(Cursor::new(&data[..]));
        assert!(r.find_sequence("first").unwrap().is_none());
    }

    #[test]
    fn parse_fasta_with_leading_empty_lines() {
        let data = b"\n\n>chr1\nACGT\n";
        let mut r = FastaReader::new(Cursor::new(&data[..]));
        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.seq, b"ACGT");
        assert!(r.next_record().unwrap().is_none());
    }
}
