mod common;

use base64::Engine;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vox_stream::adapter::messages::{
    AudioFrameMessage, StartMessage, TranscriptMessage, WireTranscript,
};
use vox_stream::{
    AdapterFactory, AudioFormat, BackendAdapter, BlockingTranscriber, EngineError, OneShotAdapter,
    OneShotFactory, TranscriptEvent,
};

#[test]
fn wire_transcript_maps_to_event() {
    let json = r#"{"text":"hello world","final":true,"confidence":0.93}"#;
    let wire: WireTranscript = serde_json::from_str(json).unwrap();
    assert!(wire.is_final);

    let event = TranscriptEvent::from(wire);
    assert_eq!(event.text, "hello world");
    assert!(event.is_final);
    assert_eq!(event.confidence, Some(0.93));
}

#[test]
fn wire_transcript_without_confidence() {
    let json = r#"{"text":"partial","final":false}"#;
    let wire: WireTranscript = serde_json::from_str(json).unwrap();
    assert!(!wire.is_final);
    assert_eq!(wire.confidence, None);
}

#[test]
fn start_message_announces_the_audio_format() {
    let msg = StartMessage::new("req-1".to_string(), &AudioFormat::default());
    let json = serde_json::to_string(&msg).unwrap();

    assert!(json.contains("\"event\":\"start\""));
    assert!(json.contains("\"encoding\":\"pcm16\""));
    assert!(json.contains("\"sample_rate\":16000"));
    assert!(json.contains("\"interim_results\":true"));
}

#[test]
fn audio_frame_message_final_marker() {
    let msg = AudioFrameMessage {
        session_id: "utt-1".to_string(),
        sequence: 10,
        pcm: String::new(),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2026-08-24T14:30:00Z".to_string(),
        final_frame: true,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"final\":true"));

    let back: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert!(back.final_frame);
    assert!(back.pcm.is_empty());
}

#[test]
fn relay_transcript_partial_flag_inverts_to_is_final() {
    let json = r#"{
        "session_id": "utt-1",
        "text": "turn on the light",
        "partial": false,
        "timestamp": "2026-08-24T14:30:05Z",
        "confidence": 0.9
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    let event = TranscriptEvent::from(msg);
    assert!(event.is_final);
    assert_eq!(event.text, "turn on the light");
}

struct CountingTranscriber {
    bytes_seen: AtomicUsize,
}

impl BlockingTranscriber for CountingTranscriber {
    fn transcribe(&self, audio: &[u8], _format: &AudioFormat) -> Result<String, EngineError> {
        self.bytes_seen.store(audio.len(), Ordering::SeqCst);
        Ok(format!("utterance of {} bytes", audio.len()))
    }
}

// The one-shot adapter buffers the whole utterance and emits exactly one
// terminal event after close.
#[tokio::test]
async fn one_shot_adapter_emits_single_terminal_event() {
    let transcriber = Arc::new(CountingTranscriber {
        bytes_seen: AtomicUsize::new(0),
    });
    let mut adapter = OneShotAdapter::new(Arc::clone(&transcriber) as Arc<dyn BlockingTranscriber>);

    let mut results = adapter.open().await.unwrap();

    for seq in 0..3 {
        adapter.send(&common::chunk(seq, 100)).await.unwrap();
    }

    // Nothing incremental before close.
    assert!(results.try_recv().is_err());

    adapter.close().await.unwrap();

    let event = results.recv().await.expect("no terminal event");
    assert!(event.is_final);
    assert_eq!(event.text, "utterance of 300 bytes");
    assert_eq!(transcriber.bytes_seen.load(Ordering::SeqCst), 300);

    // The stream ends after the terminal event.
    assert!(results.recv().await.is_none());
}

#[tokio::test]
async fn one_shot_send_before_open_is_rejected() {
    let transcriber = Arc::new(CountingTranscriber {
        bytes_seen: AtomicUsize::new(0),
    });
    let mut adapter = OneShotAdapter::new(transcriber);

    let err = adapter.send(&common::chunk(0, 10)).await.unwrap_err();
    assert!(matches!(err, EngineError::StreamClosed(_)));
}

#[tokio::test]
async fn one_shot_factory_builds_fresh_adapters() {
    let transcriber = Arc::new(CountingTranscriber {
        bytes_seen: AtomicUsize::new(0),
    });
    let factory = OneShotFactory::new(transcriber);
    assert_eq!(factory.provider(), "oneshot");

    let mut adapter = factory.create("utt-1").unwrap();
    assert_eq!(adapter.name(), "oneshot");
    let _results = adapter.open().await.unwrap();
}

#[test]
fn pcm_base64_round_trip() {
    let samples: Vec<i16> = vec![100, -200, 300, -400];
    let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    let encoded = base64::engine::general_purpose::STANDARD.encode(&pcm);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&encoded)
        .unwrap();

    let back: Vec<i16> = decoded
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    assert_eq!(back, samples);
}
