//! Send emails to users through the mailing queue.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, RecoveryConfig,
};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;
use url::Url;

use crate::config::Mail;
use crate::error::{Result, ServerError};

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";
const ID_LENGTH: usize = 12;

/// Mail templates list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum Template {
    /// Company and admin account were created.
    CompanyWelcome { company: String },
    /// One-time code to reset a password.
    PasswordReset { code: String, expires_in_minutes: i64 },
}

impl Template {
    fn name(&self) -> &'static str {
        match self {
            Template::CompanyWelcome { .. } => "company_welcome",
            Template::PasswordReset { .. } => "password_reset",
        }
    }
}

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    to: Cow<'a, str>,
    name: Cow<'a, str>,
    #[serde(flatten)]
    template: &'a Template,
}

/// Mail queue manager.
#[derive(Debug, Clone, Default)]
pub struct MailManager {
    queue: String,
    conn: Option<Arc<Connection>>,
    #[cfg(test)]
    unreachable: bool,
}

fn config_error(details: String) -> ServerError {
    ServerError::Internal {
        details,
        source: None,
    }
}

impl MailManager {
    /// Create a new [`MailManager`].
    pub async fn new(config: &Mail) -> Result<Self> {
        let addr = Url::parse(&config.address)
            .map_err(|err| ServerError::internal("invalid mail address", err))?;
        let uri = AMQPUri {
            scheme: AMQPScheme::from_str(addr.scheme()).map_err(config_error)?,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
                port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
            },
            vhost: config
                .vhost
                .clone()
                .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
            query: AMQPQueryString {
                channel_max: config.pool,
                ..Default::default()
            },
        };

        let recovery_config =
            RecoveryConfig::default().auto_recover_connection();
        let conn_config = ConnectionProperties::default()
            .with_connection_name("hirewise_mail_client".into())
            .with_experimental_recovery_config(recovery_config);
        let conn = Connection::connect_uri(uri, conn_config).await?;

        tracing::info!(%addr, queue = config.queue, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            conn: Some(Arc::new(conn)),
            ..Default::default()
        })
    }

    /// Manager whose every publication fails.
    #[cfg(test)]
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    async fn create_channel(
        conn: Arc<Connection>,
        queue: &str,
    ) -> Result<Channel> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event(data: Content) -> Cloudevent {
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: "com.hirewise.email",
            source: "com.hirewise.api",
            id: Alphanumeric.sample_string(&mut OsRng, ID_LENGTH),
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }

    /// Publish a mail event for a recipient.
    pub async fn publish_event(
        &self,
        template: Template,
        email: &str,
        name: &str,
    ) -> Result<()> {
        #[cfg(test)]
        if self.unreachable {
            return Err(config_error("mail queue unreachable".into()));
        }

        let Some(conn) = &self.conn else {
            tracing::debug!(template = template.name(), "mail queue disabled, event dropped");
            return Ok(());
        };
        let channel =
            Self::create_channel(Arc::clone(conn), &self.queue).await?;

        let payload = Self::create_event(Content {
            to: Cow::from(email),
            name: Cow::from(name),
            template: &template,
        });
        let payload = serde_json::to_string(&payload)?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload.as_bytes(),
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        tracing::trace!(template = template.name(), "mail event sent");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload() {
        let template = Template::PasswordReset {
            code: "042042".into(),
            expires_in_minutes: 10,
        };
        let event = MailManager::create_event(Content {
            to: Cow::from("jane@acme.test"),
            name: Cow::from("Jane Doe"),
            template: &template,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["specversion"], "1.0");
        assert_eq!(json["data"]["to"], "jane@acme.test");
        assert_eq!(json["data"]["template"], "password_reset");
        assert_eq!(json["data"]["code"], "042042");
        assert_eq!(json["id"].as_str().unwrap().len(), ID_LENGTH);
    }

    #[tokio::test]
    async fn test_disabled_manager_is_noop() {
        let manager = MailManager::default();
        let template = Template::CompanyWelcome {
            company: "Acme".into(),
        };
        assert!(manager.publish_event(template.clone(), "a@b.c", "A").await.is_ok());
        assert!(
            MailManager::unreachable()
                .publish_event(template, "a@b.c", "A")
                .await
                .is_err()
        );
    }
}
