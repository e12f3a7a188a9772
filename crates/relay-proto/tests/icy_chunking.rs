//! The ICY body split must not depend on how the upstream bytes were cut into
//! reads.  Builds a synthetic stream and replays it through `IcyStream` with
//! several read sizes, including single bytes.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use relay_proto::icy::{Block, BlockKind, IcyStream, ReadOptions};
use tokio::io::{AsyncRead, ReadBuf};

/// Reader that hands out at most `step` bytes per read.
struct Trickle {
    data: Vec<u8>,
    pos: usize,
    step: usize,
}

impl AsyncRead for Trickle {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let remaining = self.data.len() - self.pos;
        let n = remaining.min(self.step).min(buf.remaining());
        let start = self.pos;
        buf.put_slice(&self.data[start..start + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

const METAINT: usize = 37;

fn synthetic_stream() -> (Vec<u8>, Vec<Block>) {
    let mut raw = format!(
        "ICY 200 OK\r\nicy-name:Chunk FM\r\nicy-metaint:{}\r\n\r\n",
        METAINT
    )
    .into_bytes();
    let mut expected = Vec::new();

    // metadata lengths per round, 0 = no metadata this round
    let rounds = [1u8, 0, 3, 2, 0, 0, 1, 5];
    for (round, &units) in rounds.iter().enumerate() {
        let audio: Vec<u8> = (0..METAINT).map(|i| (round * 31 + i) as u8).collect();
        raw.extend_from_slice(&audio);
        expected.push(Block::audio(audio));

        raw.push(units);
        if units > 0 {
            let meta: Vec<u8> = (0..units as usize * 16)
                .map(|i| b'a' + ((round + i) % 26) as u8)
                .collect();
            raw.extend_from_slice(&meta);
            expected.push(Block::metadata(meta));
        }
    }
    let tail: Vec<u8> = vec![0xEE; METAINT];
    raw.extend_from_slice(&tail);
    expected.push(Block::audio(tail));

    (raw, expected)
}

async fn collect(raw: Vec<u8>, step: usize) -> Vec<Block> {
    let reader = Trickle {
        data: raw,
        pos: 0,
        step,
    };
    let mut stream = IcyStream::open(reader, ReadOptions::default())
        .await
        .expect("header should parse");
    assert_eq!(stream.session().metaint, Some(METAINT));
    assert_eq!(stream.session().source_name, b"Chunk FM");

    let mut out = Vec::new();
    while stream.next_blocks(&mut out).await.expect("body read") {}
    out
}

#[tokio::test]
async fn test_split_is_independent_of_read_size() {
    let (raw, expected) = synthetic_stream();
    for step in [1usize, 2, 3, 16, 17, 36, 37, 38, 100, 4096] {
        let got = collect(raw.clone(), step).await;
        assert_eq!(got, expected, "read size {}", step);
    }
}

#[tokio::test]
async fn test_audio_and_metadata_alternate() {
    let (raw, _) = synthetic_stream();
    let got = collect(raw, 5).await;
    for pair in got.windows(2) {
        assert!(
            !(pair[0].kind == BlockKind::Metadata && pair[1].kind == BlockKind::Metadata),
            "two metadata blocks in a row"
        );
    }
    assert_eq!(got.first().map(|b| b.kind), Some(BlockKind::Audio));
}

#[tokio::test]
async fn test_scenario_eight_byte_interval() {
    let mut raw = b"HTTP/1.1 200 OK\r\nicy-metaint: 8\r\n\r\n".to_vec();
    raw.extend_from_slice(b"AAAAAAAA");
    raw.push(1);
    raw.extend_from_slice(&[b'M'; 16]);
    raw.extend_from_slice(b"BBBBBBBB");

    let reader = Trickle {
        data: raw,
        pos: 0,
        step: 1,
    };
    let mut stream = IcyStream::open(reader, ReadOptions::default()).await.unwrap();
    let mut out = Vec::new();
    while stream.next_blocks(&mut out).await.unwrap() {}

    assert_eq!(
        out,
        vec![
            Block::audio(&b"AAAAAAAA"[..]),
            Block::metadata(vec![b'M'; 16]),
            Block::audio(&b"BBBBBBBB"[..]),
        ]
    );
}
