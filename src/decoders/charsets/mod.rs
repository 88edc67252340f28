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

pub mod utf;

use utf::{decoder_utf16, decoder_utf16_be, decoder_utf16_le, decoder_utf7, decoder_utf8};

pub type DecoderFnc = fn(&[u8]) -> String;

/// Looks up a decoder for the charset named by an RFC 2047 / Content-Type
/// `charset` token. Unknown or unsupported labels return `None`; callers
/// fall back to lossy UTF-8.
pub fn charset_decoder(charset: &[u8]) -> Option<DecoderFnc> {
    let label = std::str::from_utf8(charset).ok()?.trim().to_ascii_lowercase();

    match label.as_str() {
        "us-ascii" | "ascii" | "utf-8" | "utf8" => Some(decoder_utf8 as DecoderFnc),
        "utf-7" | "unicode-1-1-utf-7" => Some(decoder_utf7 as DecoderFnc),
        "utf-16" => Some(decoder_utf16 as DecoderFnc),
        "utf-16le" => Some(decoder_utf16_le as DecoderFnc),
        "utf-16be" => Some(decoder_utf16_be as DecoderFnc),
        _ => encoding_rs_decoder(&label),
    }
}

#[cfg(feature = "full_encoding")]
fn encoding_rs_decoder(label: &str) -> Option<DecoderFnc> {
    // `encoding_rs` exposes `Encoding`s as `'static` values, not bare
    // `fn(&[u8]) -> String` items, so each one needs its own thin wrapper
    // to coerce into our function-pointer table.
    macro_rules! enc {
        ($name:ident, $encoding:expr) => {{
            fn $name(bytes: &[u8]) -> String {
                $encoding.decode(bytes).0.into_owned()
            }
            $name as DecoderFnc
        }};
    }

    Some(match label {
        "iso-8859-1" | "latin1" => enc!(dec_8859_1, encoding_rs::WINDOWS_1252),
        "iso-8859-2" => enc!(dec_8859_2, encoding_rs::ISO_8859_2),
        "iso-8859-3" => enc!(dec_8859_3, encoding_rs::ISO_8859_3),
        "iso-8859-4" => enc!(dec_8859_4, encoding_rs::ISO_8859_4),
        "iso-8859-5" => enc!(dec_8859_5, encoding_rs::ISO_8859_5),
        "iso-8859-6" => enc!(dec_8859_6, encoding_rs::ISO_8859_6),
        "iso-8859-7" => enc!(dec_8859_7, encoding_rs::ISO_8859_7),
        "iso-8859-8" => enc!(dec_8859_8, encoding_rs::ISO_8859_8),
        "iso-8859-10" => enc!(dec_8859_10, encoding_rs::ISO_8859_10),
        "iso-8859-11" => enc!(dec_8859_11, encoding_rs::WINDOWS_874),
        "iso-8859-13" => enc!(dec_8859_13, encoding_rs::ISO_8859_13),
        "iso-8859-14" => enc!(dec_8859_14, encoding_rs::ISO_8859_14),
        "iso-8859-15" => enc!(dec_8859_15, encoding_rs::ISO_8859_15),
        "iso-8859-16" => enc!(dec_8859_16, encoding_rs::ISO_8859_16),
        "windows-874" => enc!(dec_874, encoding_rs::WINDOWS_874),
        "windows-1250" => enc!(dec_1250, encoding_rs::WINDOWS_1250),
        "windows-1251" => enc!(dec_1251, encoding_rs::WINDOWS_1251),
        "windows-1252" => enc!(dec_1252, encoding_rs::WINDOWS_1252),
        "windows-1253" => enc!(dec_1253, encoding_rs::WINDOWS_1253),
        "windows-1254" => enc!(dec_1254, encoding_rs::WINDOWS_1254),
        "windows-1255" => enc!(dec_1255, encoding_rs::WINDOWS_1255),
        "windows-1256" => enc!(dec_1256, encoding_rs::WINDOWS_1256),
        "windows-1257" => enc!(dec_1257, encoding_rs::WINDOWS_1257),
        "windows-1258" => enc!(dec_1258, encoding_rs::WINDOWS_1258),
        "macintosh" => enc!(dec_mac, encoding_rs::MACINTOSH),
        "koi8-r" => enc!(dec_koi8r, encoding_rs::KOI8_R),
        "koi8-u" => enc!(dec_koi8u, encoding_rs::KOI8_U),
        "gbk" => enc!(dec_gbk, encoding_rs::GBK),
        "gb18030" => enc!(dec_gb18030, encoding_rs::GB18030),
        "big5" => enc!(dec_big5, encoding_rs::BIG5),
        "shift_jis" | "shift-jis" => enc!(dec_sjis, encoding_rs::SHIFT_JIS),
        "euc-jp" => enc!(dec_eucjp, encoding_rs::EUC_JP),
        "iso-2022-jp" => enc!(dec_2022jp, encoding_rs::ISO_2022_JP),
        "euc-kr" => enc!(dec_euckr, encoding_rs::EUC_KR),
        _ => return None,
    })
}

#[cfg(not(feature = "full_encoding"))]
fn encoding_rs_decoder(_label: &str) -> Option<DecoderFnc> {
    None
}

#[cfg(test)]
mod tests {
    use super::charset_decoder;

    #[test]
    fn decode_charset() {
        let inputs: Vec<(&str, Vec<u8>, &str)> = vec![
            ("iso-8859-1", b"\xe1\xe9\xed\xf3\xfa".to_vec(), "áéíóú"),
            (
                "iso-8859-5",
                b"\xbf\xe0\xd8\xd2\xd5\xe2, \xdc\xd8\xe0".to_vec(),
                "Привет, мир",
            ),
            (
                "utf-7",
                b"+ZYeB9FH6ckh5Pg-, 1980.".to_vec(),
                "文致出版社, 1980.",
            ),
            (
                "utf-16le",
                b"\xcf0\xed0\xfc0\xfb0\xef0\xfc0\xeb0\xc90".to_vec(),
                "ハロー・ワールド",
            ),
            (
                "utf-16be",
                b"0\xcf0\xed0\xfc0\xfb0\xef0\xfc0\xeb0\xc9".to_vec(),
                "ハロー・ワールド",
            ),
            #[cfg(feature = "full_encoding")]
            (
                "shift_jis",
                b"\x83n\x83\x8D\x81[\x81E\x83\x8F\x81[\x83\x8B\x83h".to_vec(),
                "ハロー・ワールド",
            ),
            #[cfg(feature = "full_encoding")]
            (
                "big5",
                b"\xa7A\xa6n\xa1A\xa5@\xac\xc9".to_vec(),
                "你好，世界",
            ),
        ];

        for (charset, bytes, expected) in inputs {
            let decoder = charset_decoder(charset.as_bytes())
                .unwrap_or_else(|| panic!("no decoder for {charset}"));
            assert_eq!(decoder(&bytes), expected);
        }
    }
}
