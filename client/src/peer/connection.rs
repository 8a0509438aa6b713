//! Construction of the underlying [`RTCPeerConnection`].

use std::sync::Arc;

use webrtc::{
    api::{interceptor_registry::register_default_interceptors, media_engine::MediaEngine, APIBuilder},
    ice_transport::ice_server::RTCIceServer,
    interceptor::registry::Registry,
    peer_connection::{configuration::RTCConfiguration, RTCPeerConnection},
};

/// Builds a fresh [`RTCPeerConnection`] configured with the given STUN
/// endpoints. Mirrors the `create_peer_connection` helper any WebRTC client
/// needs: a `MediaEngine` with codecs registered, the default interceptor
/// chain (NACK/RTCP/twcc), and an `RTCConfiguration` carrying the ICE
/// server list from [`crate::config::Conf::stun_servers`].
pub async fn build(stun_servers: &[String]) -> webrtc::error::Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: stun_servers.to_vec(),
            ..Default::default()
        }],
        ..Default::default()
    };

    let pc = api.new_peer_connection(config).await?;
    Ok(Arc::new(pc))
}
