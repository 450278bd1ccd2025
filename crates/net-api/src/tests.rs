//! Unit tests for the binding style client

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netstate_config::{EngineConfig, EngineSettings, LogSink};
use netstate_core::ApplyFlags;

use crate::{ClientError, DriverKind, Netstate, NetstateContext};

const ETH1: &str = "interfaces:\n- name: eth1\n  type: ethernet\n  state: up\n";

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct BrokenWriter;

impl Write for BrokenWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

async fn memory_context() -> NetstateContext {
    let config = EngineConfig::new()
        .with_log_sink(LogSink::Discard)
        .with_verify_retries(0);
    NetstateContext::with_config(config, DriverKind::Memory)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_apply_and_retrieve() {
    let context = memory_context().await;
    let logs = SharedBuffer::default();
    let mut client = Netstate::new(context.engine.clone()).with_log_writer(logs.clone());

    client.apply_net_state(ETH1).await.unwrap();
    assert!(logs.text().contains("applying: create interface eth1"));

    let state = client.retrieve_net_state().await.unwrap();
    let state: serde_json::Value = serde_json::from_str(&state).unwrap();
    assert_eq!(state["interfaces"][0]["name"], "eth1");
}

#[tokio::test]
async fn test_error_message_format() {
    let context = memory_context().await;
    let mut client = Netstate::new(context.engine.clone()).with_log_writer(io::sink());

    let err = client.commit_checkpoint("/netstate/checkpoint/0").await.unwrap_err();
    assert_eq!(err.kind(), "UnknownCheckpoint");
    let message = err.to_string();
    assert!(message.starts_with("failed committing checkpoint /netstate/checkpoint/0 with rc: 1"));
    assert!(message.ends_with("err_kind: UnknownCheckpoint"));

    let err = client.apply_net_state("interfaces: [").await.unwrap_err();
    assert!(err.to_string().starts_with("failed applying net state interfaces: ["));
    assert_eq!(err.kind(), "MalformedDocument");
}

#[tokio::test]
async fn test_no_commit_then_rollback() {
    let context = memory_context().await;
    let mut client = Netstate::new(context.engine.clone())
        .with_log_writer(io::sink())
        .with_no_commit()
        .with_timeout(Duration::from_secs(30));
    assert_eq!(client.flags(), ApplyFlags::NO_COMMIT);

    client.apply_net_state(ETH1).await.unwrap();
    let id = client.rollback_checkpoint("").await.unwrap();
    assert!(id.starts_with(netstate_apply::CHECKPOINT_PREFIX));

    let err = client.commit_checkpoint(&id).await.unwrap_err();
    assert_eq!(err.kind(), "AlreadyFinalized");

    let state = client.retrieve_net_state().await.unwrap();
    assert!(!state.contains("eth1"));
}

#[tokio::test]
async fn test_log_write_failure() {
    let context = memory_context().await;
    let mut client = Netstate::new(context.engine.clone()).with_log_writer(BrokenWriter);

    let err = client.retrieve_net_state().await.unwrap_err();
    assert!(matches!(err, ClientError::LogWrite(_)));
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_settings() {
    let settings = EngineSettings {
        kernel_only: true,
        no_commit: true,
        ..Default::default()
    };
    assert!(NetstateContext::bootstrap(settings, DriverKind::Memory)
        .await
        .is_err());
}

#[tokio::test]
async fn test_bootstrap_with_checkpoint_dir() {
    let dir = tempfile::tempdir().unwrap();
    let settings = EngineSettings {
        checkpoint_dir: Some(dir.path().join("checkpoints")),
        ..Default::default()
    };
    let context = NetstateContext::bootstrap(settings, DriverKind::Memory)
        .await
        .unwrap();
    assert_eq!(context.driver.name(), "memory");
    assert!(dir.path().join("checkpoints").is_dir());
}
