use std::fmt;

use crate::NodeId;
use crate::PeerId;

/// The ways callers may address a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeIdentity {
    Id(NodeId),
    Name(String),
    PeerId(PeerId),
    /// `<protocol>://<peer_id>`, as reported to agents
    RpcAddress(String),
}

impl NodeIdentity {
    /// Resolves an rpc address to the peer id it embeds
    pub(crate) fn normalized(&self) -> NodeIdentity {
        match self {
            NodeIdentity::RpcAddress(address) => {
                let peer = address
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or(address.as_str());
                NodeIdentity::PeerId(PeerId::new(peer))
            }
            other => other.clone(),
        }
    }
}

impl From<NodeId> for NodeIdentity {
    fn from(id: NodeId) -> Self {
        NodeIdentity::Id(id)
    }
}

impl From<&NodeId> for NodeIdentity {
    fn from(id: &NodeId) -> Self {
        NodeIdentity::Id(id.clone())
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            NodeIdentity::Id(id) => write!(f, "id={id}"),
            NodeIdentity::Name(name) => write!(f, "name={name}"),
            NodeIdentity::PeerId(peer) => write!(f, "peer_id={peer}"),
            NodeIdentity::RpcAddress(address) => write!(f, "rpc_address={address}"),
        }
    }
}
