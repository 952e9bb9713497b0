//! On-the-fly decompression/recompression of proxied response bodies
//! (spec.md §4.D "Decompression"). Built entirely on `Stream<Item =
//! io::Result<Bytes>>` so a response is never buffered whole: `StreamReader`
//! (tokio-util) adapts the byte stream to `AsyncRead`, the `async-compression`
//! codec wraps that, and `ReaderStream` turns the decoded/encoded output
//! back into a stream the rest of the pipeline can keep chunking through.

use std::pin::Pin;

use async_compression::tokio::bufread::{
    BrotliDecoder, BrotliEncoder, GzipDecoder, GzipEncoder, ZlibDecoder, ZlibEncoder, ZstdDecoder, ZstdEncoder,
};
use bytes::Bytes;
use futures_util::Stream;
use tokio::io::BufReader;
use tokio_util::io::{ReaderStream, StreamReader};

pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
    Brotli,
    Deflate,
    Zstd,
}

impl Encoding {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Encoding::Gzip,
            "br" => Encoding::Brotli,
            "deflate" => Encoding::Deflate,
            "zstd" => Encoding::Zstd,
            _ => Encoding::Identity,
        }
    }

    pub fn header_value(self) -> Option<&'static str> {
        match self {
            Encoding::Identity => None,
            Encoding::Gzip => Some("gzip"),
            Encoding::Brotli => Some("br"),
            Encoding::Deflate => Some("deflate"),
            Encoding::Zstd => Some("zstd"),
        }
    }

    /// Whether a client's `Accept-Encoding` header still permits this
    /// scheme; `identity` is always acceptable.
    pub fn accepted_by(self, accept_encoding: Option<&str>) -> bool {
        let Some(name) = self.header_value() else {
            return true;
        };
        accept_encoding
            .map(|header| {
                header
                    .split(',')
                    .any(|part| part.split(';').next().unwrap_or("").trim().eq_ignore_ascii_case(name))
            })
            .unwrap_or(false)
    }
}

pub fn decompress(encoding: Encoding, input: ByteStream) -> ByteStream {
    match encoding {
        Encoding::Identity => input,
        Encoding::Gzip => Box::pin(ReaderStream::new(GzipDecoder::new(BufReader::new(StreamReader::new(input))))),
        Encoding::Brotli => Box::pin(ReaderStream::new(BrotliDecoder::new(BufReader::new(StreamReader::new(input))))),
        Encoding::Deflate => Box::pin(ReaderStream::new(ZlibDecoder::new(BufReader::new(StreamReader::new(input))))),
        Encoding::Zstd => Box::pin(ReaderStream::new(ZstdDecoder::new(BufReader::new(StreamReader::new(input))))),
    }
}

/// Recompress with the same scheme the backend used, unless the client's
/// `Accept-Encoding` excludes it — callers are expected to have already
/// checked [`Encoding::accepted_by`] and fall back to `Identity` themselves.
pub fn compress(encoding: Encoding, input: ByteStream) -> ByteStream {
    match encoding {
        Encoding::Identity => input,
        Encoding::Gzip => Box::pin(ReaderStream::new(GzipEncoder::new(BufReader::new(StreamReader::new(input))))),
        Encoding::Brotli => Box::pin(ReaderStream::new(BrotliEncoder::new(BufReader::new(StreamReader::new(input))))),
        Encoding::Deflate => Box::pin(ReaderStream::new(ZlibEncoder::new(BufReader::new(StreamReader::new(input))))),
        Encoding::Zstd => Box::pin(ReaderStream::new(ZstdEncoder::new(BufReader::new(StreamReader::new(input))))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_header_recognises_all_four_schemes() {
        assert_eq!(Encoding::from_header("gzip"), Encoding::Gzip);
        assert_eq!(Encoding::from_header("br"), Encoding::Brotli);
        assert_eq!(Encoding::from_header("deflate"), Encoding::Deflate);
        assert_eq!(Encoding::from_header("zstd"), Encoding::Zstd);
        assert_eq!(Encoding::from_header("identity"), Encoding::Identity);
    }

    #[test]
    fn accepted_by_respects_exclusion() {
        assert!(!Encoding::Brotli.accepted_by(Some("gzip, deflate")));
        assert!(Encoding::Gzip.accepted_by(Some("gzip, br")));
        assert!(Encoding::Identity.accepted_by(Some("gzip")));
        assert!(!Encoding::Gzip.accepted_by(None));
    }
}
