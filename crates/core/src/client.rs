//! Connection step for credential-backed clients.
//!
//! A bearer token provider is built offline, then connected once before the first API
//! request: connecting loads the service account key or the application default
//! credentials and creates the token source that later requests draw tokens from.
//! Nothing is sent to the control plane while connecting.

/// A client that must load credentials before it can issue requests.
///
/// `connect` consumes the unconnected value and returns it ready for use, so a
/// provider that failed to load its credentials can never hand out tokens.
pub trait Client {
    type Error;

    /// Loads credentials and prepares the token source.
    fn connect(self) -> impl std::future::Future<Output = Result<Self, Self::Error>> + Send
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct KeyFileProvider {
        key: Option<&'static str>,
        source: Option<String>,
    }

    impl Client for KeyFileProvider {
        type Error = &'static str;

        async fn connect(mut self) -> Result<Self, Self::Error> {
            let key = self.key.ok_or("no credentials")?;
            self.source = Some(format!("token-source:{key}"));
            Ok(self)
        }
    }

    #[tokio::test]
    async fn test_connect_prepares_token_source() {
        let provider = KeyFileProvider {
            key: Some("sa.json"),
            ..Default::default()
        };
        let connected = provider.connect().await.unwrap();
        assert_eq!(connected.source.as_deref(), Some("token-source:sa.json"));

        let err = KeyFileProvider::default().connect().await.unwrap_err();
        assert_eq!(err, "no credentials");
    }
}
