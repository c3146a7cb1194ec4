// SPDX-License-Identifier: Apache-2.0

//! SASL and TLS settings shared by the log producer, the ingestion consumer
//! and the dead-letter producer.

use rdkafka::ClientConfig;

#[derive(Copy, Clone, PartialEq, Debug, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

#[derive(Copy, Clone, PartialEq, Debug, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    /// Convert to the string value expected by librdkafka
    pub fn to_kafka_value(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "plaintext",
            SecurityProtocol::SaslPlaintext => "sasl_plaintext",
            SecurityProtocol::Ssl => "ssl",
            SecurityProtocol::SaslSsl => "sasl_ssl",
        }
    }
}

impl SaslMechanism {
    /// Convert to the string value expected by librdkafka
    pub fn to_kafka_value(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct KafkaSecurity {
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub sasl_mechanism: Option<SaslMechanism>,
    pub security_protocol: Option<SecurityProtocol>,
    pub ssl_ca_location: Option<String>,
    pub ssl_certificate_location: Option<String>,
    pub ssl_key_location: Option<String>,
    pub ssl_key_password: Option<String>,
}

impl KafkaSecurity {
    pub fn with_sasl_auth(
        mut self,
        username: String,
        password: String,
        mechanism: SaslMechanism,
        security_protocol: SecurityProtocol,
    ) -> Self {
        self.sasl_username = Some(username);
        self.sasl_password = Some(password);
        self.sasl_mechanism = Some(mechanism);
        self.security_protocol = Some(security_protocol);
        self
    }

    /// Sets the TLS files. Selects the `ssl` protocol when any file is given
    /// and no protocol was chosen yet.
    pub fn with_ssl_config(
        mut self,
        ca_location: Option<String>,
        cert_location: Option<String>,
        key_location: Option<String>,
        key_password: Option<String>,
    ) -> Self {
        self.ssl_ca_location = ca_location;
        self.ssl_certificate_location = cert_location;
        self.ssl_key_location = key_location;
        self.ssl_key_password = key_password;
        if self.security_protocol.is_none()
            && (self.ssl_ca_location.is_some()
                || self.ssl_certificate_location.is_some()
                || self.ssl_key_location.is_some()
                || self.ssl_key_password.is_some())
        {
            self.security_protocol = Some(SecurityProtocol::Ssl);
        }
        self
    }

    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol.to_kafka_value());
        }

        if let Some(ref mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism.to_kafka_value());
        }

        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }

        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }

        if let Some(ref ca_location) = self.ssl_ca_location {
            config.set("ssl.ca.location", ca_location);
        }

        if let Some(ref cert_location) = self.ssl_certificate_location {
            config.set("ssl.certificate.location", cert_location);
        }

        if let Some(ref key_location) = self.ssl_key_location {
            config.set("ssl.key.location", key_location);
        }

        if let Some(ref key_password) = self.ssl_key_password {
            config.set("ssl.key.password", key_password);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sasl_auth_config() {
        let security = KafkaSecurity::default().with_sasl_auth(
            "user".to_string(),
            "pass".to_string(),
            SaslMechanism::ScramSha256,
            SecurityProtocol::SaslSsl,
        );

        let mut config = ClientConfig::new();
        security.apply(&mut config);
        assert_eq!(config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(config.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
        assert_eq!(config.get("sasl.username"), Some("user"));
        assert_eq!(config.get("sasl.password"), Some("pass"));
    }

    #[test]
    fn test_ssl_config_selects_protocol() {
        let security = KafkaSecurity::default().with_ssl_config(
            Some("/path/to/ca.pem".to_string()),
            None,
            None,
            None,
        );
        assert_eq!(security.security_protocol, Some(SecurityProtocol::Ssl));

        let security = KafkaSecurity::default()
            .with_sasl_auth(
                "user".to_string(),
                "pass".to_string(),
                SaslMechanism::Plain,
                SecurityProtocol::SaslSsl,
            )
            .with_ssl_config(Some("/path/to/ca.pem".to_string()), None, None, None);
        assert_eq!(security.security_protocol, Some(SecurityProtocol::SaslSsl));

        let mut config = ClientConfig::new();
        security.apply(&mut config);
        assert_eq!(config.get("ssl.ca.location"), Some("/path/to/ca.pem"));
        assert_eq!(config.get("ssl.key.location"), None);
    }

    #[test]
    fn test_empty_security_sets_nothing() {
        let mut config = ClientConfig::new();
        KafkaSecurity::default().apply(&mut config);
        for key in ["security.protocol", "sasl.mechanism", "sasl.username", "ssl.ca.location"] {
            assert_eq!(config.get(key), None);
        }
    }
}
