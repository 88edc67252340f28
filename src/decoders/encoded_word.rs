/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::{decoders::charsets::charset_decoder, parsers::MessageStream};

use super::base64::decode_base64_word;

enum Rfc2047State {
    Init,
    Charset,
    Encoding,
    Data,
}

enum Rfc2047Encoding {
    Quoted,
    Base64,
}

impl<'x> MessageStream<'x> {
    /// Decodes an RFC 2047 encoded-word `=?charset?encoding?text?=`, the
    /// caller having already consumed the leading `=?`.
    pub fn decode_rfc2047(&mut self) -> Option<String> {
        let mut state = Rfc2047State::Init;

        let mut charset_start = 0;
        let mut charset_end = 0;
        let mut encoding = None;

        loop {
            let ch = *self.next()?;
            match state {
                Rfc2047State::Init => {
                    state = Rfc2047State::Charset;
                    charset_start = self.offset() - 1;
                    charset_end = charset_start;
                }
                Rfc2047State::Charset => match ch {
                    b'?' => {
                        if charset_end == charset_start {
                            charset_end = self.offset() - 1;
                        }
                        if (charset_end - charset_start) < 1 {
                            return None;
                        }
                        state = Rfc2047State::Encoding;
                    }
                    b'*' => {
                        if charset_end == charset_start {
                            charset_end = self.offset() - 1;
                        }
                    }
                    b'\n' => return None,
                    _ => (),
                },
                Rfc2047State::Encoding => {
                    encoding = match ch {
                        b'q' | b'Q' => Some(Rfc2047Encoding::Quoted),
                        b'b' | b'B' => Some(Rfc2047Encoding::Base64),
                        _ => return None,
                    };
                    state = Rfc2047State::Data;
                }
                Rfc2047State::Data => {
                    if ch != b'?' {
                        return None;
                    }
                    break;
                }
            }
        }

        let bytes = match encoding? {
            Rfc2047Encoding::Quoted => self.decode_quoted_printable_word()?,
            Rfc2047Encoding::Base64 => {
                let start = self.offset();
                let (consumed, buf) = decode_base64_word(self.bytes(start..self.len()));
                self.skip_bytes(consumed);
                buf
            }
        };

        Some(
            if let Some(decoder) = charset_decoder(self.bytes(charset_start..charset_end)) {
                decoder(&bytes)
            } else {
                String::from_utf8(bytes)
                    .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::parsers::MessageStream;

    #[test]
    fn decode_rfc2047() {
        for (input, expected_result) in [
            ("?iso-8859-1?q?this=20is=20some=20text?=", "this is some text"),
            ("?iso-8859-1?q?this is some text?=", "this is some text"),
            ("?US-ASCII?Q?Keith_Moore?=", "Keith Moore"),
            (
                "?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=",
                "If you can read this yo",
            ),
            ("?ISO-8859-1?Q?Olle_J=E4rnefors?=", "Olle Järnefors"),
        ] {
            match MessageStream::new(input.as_bytes()).decode_rfc2047() {
                Some(result) => assert_eq!(result, expected_result),
                None => panic!("Failed to decode {input:?}"),
            }
        }
    }
}
