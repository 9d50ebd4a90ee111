//! Line-delimited JSON codec.

/// One JSON message per `\n`-terminated line.
pub mod jsonl {
    use crate::error::ProtocolError;
    use crate::message::Response;
    use crate::MAX_LINE_BYTES;

    /// Encodes a value as a JSON line.
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = serde_json::to_vec(value)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Encodes a response as a JSON line.
    pub fn encode_response(response: &Response) -> Result<Vec<u8>, ProtocolError> {
        encode(response)
    }

    /// Buffering line decoder for byte streams.
    pub struct LineDecoder {
        buffer: Vec<u8>,
        max_line: usize,
    }

    impl LineDecoder {
        pub fn new() -> Self {
            Self::with_max_line(MAX_LINE_BYTES)
        }

        pub fn with_max_line(max_line: usize) -> Self {
            Self {
                buffer: Vec::with_capacity(4096),
                max_line,
            }
        }

        pub fn extend(&mut self, data: &[u8]) {
            self.buffer.extend_from_slice(data);
        }

        /// Returns the number of bytes currently buffered.
        pub fn buffered(&self) -> usize {
            self.buffer.len()
        }

        /// Attempts to decode the next JSON line.
        ///
        /// Blank lines are skipped. A line longer than the limit is an error,
        /// as is an unterminated buffer that has already grown past it.
        pub fn decode_line<T: serde::de::DeserializeOwned>(
            &mut self,
        ) -> Result<Option<T>, ProtocolError> {
            loop {
                let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                    if self.buffer.len() > self.max_line {
                        let size = self.buffer.len();
                        self.buffer.clear();
                        return Err(ProtocolError::LineTooLong {
                            size,
                            max: self.max_line,
                        });
                    }
                    return Ok(None);
                };

                let line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                if line.len() - 1 > self.max_line {
                    return Err(ProtocolError::LineTooLong {
                        size: line.len() - 1,
                        max: self.max_line,
                    });
                }
                let json = std::str::from_utf8(&line[..line.len() - 1])
                    .map_err(|_| ProtocolError::InvalidUtf8)?
                    .trim_end_matches('\r');
                if json.trim().is_empty() {
                    continue;
                }
                return Ok(Some(serde_json::from_str(json)?));
            }
        }
    }

    impl Default for LineDecoder {
        fn default() -> Self {
            Self::new()
        }
    }
}
