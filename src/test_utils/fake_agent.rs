use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use serde_json::Value;
use tokio::sync::watch;

use crate::AgentConnection;
use crate::AgentInfo;
use crate::Error;
use crate::NetworkTestParams;
use crate::RemoteError;
use crate::Result;
use crate::RpcConfigUpdate;
use crate::SslCerts;
use crate::StorePerf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeFailure {
    Timeout,
    StorageNotExist,
    AuthFailed,
    Rpc,
}

impl FakeFailure {
    fn into_error(self) -> Error {
        match self {
            FakeFailure::Timeout => RemoteError::Timeout {
                op: "fake",
                duration: Duration::from_millis(1),
            }
            .into(),
            FakeFailure::StorageNotExist => RemoteError::StorageNotExist("gone".into()).into(),
            FakeFailure::AuthFailed => RemoteError::AuthFailed("denied".into()).into(),
            FakeFailure::Rpc => RemoteError::Rpc {
                code: "INTERNAL".into(),
                message: "fake failure".into(),
            }
            .into(),
        }
    }
}

/// Scriptable in-process agent
pub(crate) struct FakeAgent {
    id: u64,
    host: String,
    connected: AtomicBool,
    closed_tx: watch::Sender<bool>,
    pub(crate) info: Mutex<AgentInfo>,
    pub(crate) perf: Mutex<StorePerf>,
    pub(crate) info_failure: Mutex<Option<FakeFailure>>,
    pub(crate) store_failure: Mutex<Option<FakeFailure>>,
    pub(crate) network_failure: Mutex<Option<FakeFailure>>,
    pub(crate) peer_failure: Mutex<Option<FakeFailure>>,
    pub(crate) auth_token_failure: Mutex<Option<FakeFailure>>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) service_enabled: Mutex<Option<bool>>,
    pub(crate) auth_tokens: Mutex<Vec<String>>,
    pub(crate) rpc_configs: Mutex<Vec<RpcConfigUpdate>>,
    pub(crate) debug_level: Mutex<Option<u32>>,
}

impl FakeAgent {
    pub(crate) fn new(
        id: u64,
        host: &str,
    ) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            id,
            host: host.to_string(),
            connected: AtomicBool::new(true),
            closed_tx,
            info: Mutex::new(AgentInfo::default()),
            perf: Mutex::new(StorePerf {
                read: vec![2.0, 4.0],
                write: vec![3.0, 5.0],
            }),
            info_failure: Mutex::new(None),
            store_failure: Mutex::new(None),
            network_failure: Mutex::new(None),
            peer_failure: Mutex::new(None),
            auth_token_failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            service_enabled: Mutex::new(None),
            auth_tokens: Mutex::new(Vec::new()),
            rpc_configs: Mutex::new(Vec::new()),
            debug_level: Mutex::new(None),
        }
    }

    pub(crate) fn with_info(
        self,
        info: AgentInfo,
    ) -> Self {
        *self.info.lock() = info;
        self
    }

    pub(crate) fn called(
        &self,
        method: &str,
    ) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == method).count()
    }

    fn record(
        &self,
        method: &str,
    ) {
        self.calls.lock().push(method.to_string());
    }

    fn check(
        slot: &Mutex<Option<FakeFailure>>,
    ) -> Result<()> {
        match *slot.lock() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AgentConnection for FakeAgent {
    fn connection_id(&self) -> u64 {
        self.id
    }

    fn remote_host(&self) -> String {
        self.host.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed_tx.send_replace(true);
    }

    async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn get_agent_info(
        &self,
        _server_addresses: Vec<String>,
    ) -> Result<AgentInfo> {
        self.record("get_agent_info");
        Self::check(&self.info_failure)?;
        Ok(self.info.lock().clone())
    }

    async fn update_node_service(
        &self,
        enabled: bool,
        _certs: Option<SslCerts>,
    ) -> Result<()> {
        self.record("update_node_service");
        *self.service_enabled.lock() = Some(enabled);
        Ok(())
    }

    async fn update_auth_token(
        &self,
        token: String,
    ) -> Result<()> {
        self.record("update_auth_token");
        Self::check(&self.auth_token_failure)?;
        self.auth_tokens.lock().push(token);
        Ok(())
    }

    async fn update_create_node_token(
        &self,
        _token: String,
    ) -> Result<()> {
        self.record("update_create_node_token");
        Ok(())
    }

    async fn update_rpc_config(
        &self,
        config: RpcConfigUpdate,
    ) -> Result<()> {
        self.record("update_rpc_config");
        self.rpc_configs.lock().push(config);
        Ok(())
    }

    async fn test_store_perf(
        &self,
        _count: u32,
    ) -> Result<StorePerf> {
        self.record("test_store_perf");
        Self::check(&self.store_failure)?;
        Ok(self.perf.lock().clone())
    }

    async fn test_network_perf_to_peer(
        &self,
        params: NetworkTestParams,
    ) -> Result<Value> {
        self.record("test_network_perf_to_peer");
        Self::check(&self.peer_failure)?;
        Ok(json!({ "target": params.target }))
    }

    async fn test_network_perf(
        &self,
        _params: NetworkTestParams,
    ) -> Result<()> {
        self.record("test_network_perf");
        Self::check(&self.network_failure)
    }

    async fn set_debug_level(
        &self,
        level: u32,
    ) -> Result<()> {
        self.record("set_debug_level");
        *self.debug_level.lock() = Some(level);
        Ok(())
    }

    async fn proxy(
        &self,
        method: String,
        params: Value,
    ) -> Result<Value> {
        self.record("proxy");
        Ok(json!({ "method": method, "params": params }))
    }
}
