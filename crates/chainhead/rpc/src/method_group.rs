use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use strata_chainhead_types::RpcMethods;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{MethodGroupError, RawSubscription, RpcTransport, TransportError};

/// Discovery method listing every method a node serves.
pub const RPC_METHODS: &str = "rpc_methods";

/// A group of JSON-RPC methods sharing a prefix and a version segment, e.g.
/// `chainHead_v1_follow`.
///
/// The version is detected once per connection from the node's advertised
/// method list and cached afterwards.
#[derive(Debug)]
pub struct VersionedMethodGroup<T> {
    transport: Arc<T>,
    prefix: String,
    supported_versions: Option<Vec<String>>,
    fixed_version: Option<String>,
    detected: OnceCell<String>,
}

impl<T: RpcTransport> VersionedMethodGroup<T> {
    pub fn new(transport: Arc<T>, prefix: impl Into<String>) -> Self {
        Self {
            transport,
            prefix: prefix.into(),
            supported_versions: None,
            fixed_version: None,
            detected: OnceCell::new(),
        }
    }

    /// Restricts the versions this client agrees to talk.
    pub fn with_supported_versions(mut self, versions: Vec<String>) -> Self {
        self.supported_versions = Some(versions);
        self
    }

    /// Uses the given version without asking the node.
    pub fn with_fixed_version(mut self, version: impl Into<String>) -> Self {
        self.fixed_version = Some(version.into());
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Returns the version segment the node uses for this group.
    pub async fn version(&self) -> Result<&str, MethodGroupError> {
        if let Some(version) = &self.fixed_version {
            return Ok(version.as_str());
        }

        let detected = self
            .detected
            .get_or_try_init(|| self.detect_version())
            .await?;

        if let Some(supported) = &self.supported_versions {
            if !supported.iter().any(|v| v == detected) {
                return Err(MethodGroupError::UnsupportedVersion {
                    prefix: self.prefix.clone(),
                    version: detected.clone(),
                });
            }
        }

        Ok(detected.as_str())
    }

    /// Returns whether the node serves this group in a version we accept.
    pub async fn supported(&self) -> bool {
        match self.version().await {
            Ok(_) => true,
            Err(err) => {
                debug!(prefix = %self.prefix, %err, "method group not supported");
                false
            }
        }
    }

    /// Builds the fully qualified name of `method`.
    pub async fn method_name(&self, method: &str) -> Result<String, MethodGroupError> {
        let version = self.version().await?;
        Ok(format!("{}_{}_{}", self.prefix, version, method))
    }

    /// Calls `method` of the group and decodes the result.
    pub async fn send<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<R, MethodGroupError> {
        let name = self.method_name(method).await?;
        let raw = self.transport.request(&name, params).await?;
        serde_json::from_value(raw)
            .map_err(|e| TransportError::decode(format!("{name}: {e}")).into())
    }

    /// Opens a subscription through `method`, torn down with
    /// `unsubscribe_method`.
    pub async fn subscribe(
        &self,
        method: &str,
        unsubscribe_method: &str,
        params: Vec<Value>,
    ) -> Result<RawSubscription, MethodGroupError> {
        let name = self.method_name(method).await?;
        let unsubscribe = self.method_name(unsubscribe_method).await?;
        Ok(self.transport.subscribe(&name, params, &unsubscribe).await?)
    }

    async fn detect_version(&self) -> Result<String, MethodGroupError> {
        let raw = self.transport.request(RPC_METHODS, Vec::new()).await?;
        let RpcMethods { methods } = serde_json::from_value(raw)
            .map_err(|e| TransportError::decode(format!("{RPC_METHODS}: {e}")))?;

        let group_prefix = format!("{}_", self.prefix);
        let version = methods
            .iter()
            .filter_map(|method| method.strip_prefix(&group_prefix))
            .filter_map(|rest| rest.split('_').next())
            .find(|version| !version.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| MethodGroupError::NoMethodsForPrefix(self.prefix.clone()))?;

        debug!(prefix = %self.prefix, %version, "detected method group version");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::MockRpcTransport;

    fn methods_response(methods: &[&str]) -> Value {
        json!({ "methods": methods })
    }

    fn transport_with_methods(methods: &'static [&'static str]) -> MockRpcTransport {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_request()
            .withf(|method, _| method == RPC_METHODS)
            .times(1)
            .returning(move |_, _| Ok(methods_response(methods)));
        transport
    }

    #[tokio::test]
    async fn test_detects_version_from_first_match() {
        let transport = transport_with_methods(&[
            "system_name",
            "chainHead_v1_follow",
            "chainHead_v1_body",
            "chainSpec_v1_chainName",
        ]);
        let group = VersionedMethodGroup::new(Arc::new(transport), "chainHead");

        assert_eq!(group.version().await.unwrap(), "v1");
        assert_eq!(
            group.method_name("follow").await.unwrap(),
            "chainHead_v1_follow"
        );
    }

    #[tokio::test]
    async fn test_detection_is_cached() {
        // `times(1)` on the discovery call makes a second fetch fail the test.
        let transport = transport_with_methods(&["chainHead_unstable_follow"]);
        let group = VersionedMethodGroup::new(Arc::new(transport), "chainHead");

        assert_eq!(group.version().await.unwrap(), "unstable");
        assert_eq!(group.version().await.unwrap(), "unstable");
        assert!(group.supported().await);
    }

    #[tokio::test]
    async fn test_no_methods_for_prefix() {
        let transport = transport_with_methods(&["system_name", "chainHeadX_v1_follow"]);
        let group = VersionedMethodGroup::new(Arc::new(transport), "chainHead");

        let err = group.version().await.unwrap_err();
        assert!(matches!(err, MethodGroupError::NoMethodsForPrefix(p) if p == "chainHead"));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let transport = transport_with_methods(&["chainHead_unstable_follow"]);
        let group = VersionedMethodGroup::new(Arc::new(transport), "chainHead")
            .with_supported_versions(vec!["v1".to_string()]);

        let err = group.version().await.unwrap_err();
        match err {
            MethodGroupError::UnsupportedVersion { prefix, version } => {
                assert_eq!(prefix, "chainHead");
                assert_eq!(version, "unstable");
            }
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
        assert!(!group.supported().await);
    }

    #[tokio::test]
    async fn test_supported_swallows_transport_errors() {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_request()
            .returning(|_, _| Err(TransportError::Closed));
        let group = VersionedMethodGroup::new(Arc::new(transport), "chainHead");

        assert!(!group.supported().await);
    }

    #[tokio::test]
    async fn test_fixed_version_skips_detection() {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_request()
            .withf(|method, params| {
                method == "chainHead_unstable_header" && params == &vec![json!("sub"), json!("0x1")]
            })
            .times(1)
            .returning(|_, _| Ok(json!("0xdeadbeef")));
        let group = VersionedMethodGroup::new(Arc::new(transport), "chainHead")
            .with_fixed_version("unstable");

        let header: Option<String> = group
            .send("header", vec![json!("sub"), json!("0x1")])
            .await
            .unwrap();
        assert_eq!(header.as_deref(), Some("0xdeadbeef"));
    }

    #[tokio::test]
    async fn test_send_reports_decode_errors() {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_request()
            .returning(|_, _| Ok(json!({ "unexpected": true })));
        let group =
            VersionedMethodGroup::new(Arc::new(transport), "chainHead").with_fixed_version("v1");

        let err = group.send::<u64>("header", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            MethodGroupError::Transport(TransportError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_uses_versioned_names() {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_subscribe()
            .withf(|method, params, unsubscribe| {
                method == "chainHead_v1_follow"
                    && unsubscribe == "chainHead_v1_unfollow"
                    && params == &vec![json!(true)]
            })
            .times(1)
            .returning(|_, _, _| Ok(RawSubscription::channel("sub-7").0));
        let group =
            VersionedMethodGroup::new(Arc::new(transport), "chainHead").with_fixed_version("v1");

        let sub = group
            .subscribe("follow", "unfollow", vec![json!(true)])
            .await
            .unwrap();
        assert_eq!(sub.id(), "sub-7");
    }
}
