//! Contains available options to configure the [WebhookServer][crate::WebhookServer].
use std::net::{IpAddr, SocketAddr};

use crate::constants::DEFAULT_SOCKET_ADDRESS;

/// Specifies available webhook server options.
///
/// The [`Default`] implementation for this struct contains the following values:
///
/// - The socket binds to `0.0.0.0` on port 8443 (HTTPS)
/// - An empty list of SANs is provided to the certificate the TLS server uses.
///
/// ### Example with Custom HTTPS IP Address and Port
///
/// ```
/// use appwrapper_webhook::WebhookServerOptions;
///
/// let options = WebhookServerOptions::builder()
///     .bind_address([0, 0, 0, 0], 12345)
///     .webhook_service_name("appwrapper-webhook")
///     .webhook_namespace("appwrapper-system")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct WebhookServerOptions {
    /// The socket address the [`TcpListener`][tokio::net::TcpListener] binds to.
    pub socket_addr: SocketAddr,

    /// The subject alterative DNS names that should be added to the certificates generated for
    /// this webhook.
    pub subject_alterative_dns_names: Vec<String>,

    /// Name of the Kubernetes `Service` fronting this webhook, used to build the
    /// `clientConfig` of the webhook configuration objects.
    pub webhook_service_name: String,

    /// Namespace of the Kubernetes `Service` fronting this webhook.
    pub webhook_namespace: String,
}

impl Default for WebhookServerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WebhookServerOptions {
    /// Returns the default [`WebhookServerOptionsBuilder`] which allows to selectively
    /// customize the options.
    pub fn builder() -> WebhookServerOptionsBuilder {
        WebhookServerOptionsBuilder::default()
    }
}

/// The [`WebhookServerOptionsBuilder`] which allows to selectively customize the webhook server
/// [`WebhookServerOptions`].
#[derive(Debug, Default)]
pub struct WebhookServerOptionsBuilder {
    socket_addr: Option<SocketAddr>,
    subject_alterative_dns_names: Vec<String>,
    webhook_service_name: Option<String>,
    webhook_namespace: Option<String>,
}

impl WebhookServerOptionsBuilder {
    /// Sets the socket address the webhook server uses to bind for HTTPS.
    pub fn bind_address(mut self, bind_ip: impl Into<IpAddr>, bind_port: u16) -> Self {
        self.socket_addr = Some(SocketAddr::new(bind_ip.into(), bind_port));
        self
    }

    /// Sets the IP address of the socket address the webhook server uses to bind for HTTPS.
    pub fn bind_ip(mut self, bind_ip: impl Into<IpAddr>) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_ip(bind_ip.into());
        self
    }

    /// Sets the port of the socket address the webhook server uses to bind for HTTPS.
    pub fn bind_port(mut self, bind_port: u16) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_port(bind_port);
        self
    }

    /// Sets the subject alterative DNS names that should be added to the certificates generated
    /// for this webhook.
    pub fn subject_alterative_dns_names(
        mut self,
        subject_alterative_dns_names: Vec<String>,
    ) -> Self {
        self.subject_alterative_dns_names = subject_alterative_dns_names;
        self
    }

    /// Adds the subject alterative DNS name to the list of names.
    pub fn add_subject_alterative_dns_name(
        mut self,
        subject_alterative_dns_name: impl Into<String>,
    ) -> Self {
        self.subject_alterative_dns_names
            .push(subject_alterative_dns_name.into());
        self
    }

    /// Sets the name of the Kubernetes `Service` fronting this webhook.
    pub fn webhook_service_name(mut self, webhook_service_name: impl Into<String>) -> Self {
        self.webhook_service_name = Some(webhook_service_name.into());
        self
    }

    /// Sets the namespace of the Kubernetes `Service` fronting this webhook.
    pub fn webhook_namespace(mut self, webhook_namespace: impl Into<String>) -> Self {
        self.webhook_namespace = Some(webhook_namespace.into());
        self
    }

    /// Builds the final [`WebhookServerOptions`] by using default values for any not explicitly
    /// set option.
    pub fn build(self) -> WebhookServerOptions {
        WebhookServerOptions {
            socket_addr: self.socket_addr.unwrap_or(DEFAULT_SOCKET_ADDRESS),
            subject_alterative_dns_names: self.subject_alterative_dns_names,
            webhook_service_name: self.webhook_service_name.unwrap_or_default(),
            webhook_namespace: self.webhook_namespace.unwrap_or_default(),
        }
    }
}
