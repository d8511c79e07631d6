//! Connection and notifier settings shared by every subcommand.
//!
//! Each flag falls back to an `RFIDGATE_*` environment variable, then to a
//! built-in default.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use rfidgate_core::{
    DisabledNotifier, MqttNotifier, MqttSettings, Notifier, ToggleWorkflow,
};
use rfidgate_sqlite::SqliteStorage;
use tracing::info;

/// Where the registry and event log live.
#[derive(Debug, Clone, Args)]
pub(crate) struct DatabaseArgs {
    /// SQLite database URL
    #[arg(
        long,
        global = true,
        env = "RFIDGATE_DATABASE_URL",
        default_value = "sqlite://rfidgate.db"
    )]
    pub(crate) database_url: String,

    /// Maximum pooled database connections
    #[arg(
        long,
        global = true,
        env = "RFIDGATE_MAX_CONNECTIONS",
        default_value_t = 5
    )]
    pub(crate) max_connections: u32,
}

impl DatabaseArgs {
    pub(crate) async fn connect(&self) -> Result<SqliteStorage, Box<dyn std::error::Error>> {
        let storage = SqliteStorage::connect(&self.database_url, self.max_connections).await?;
        Ok(storage)
    }
}

/// Broker settings for status notifications.
#[derive(Debug, Clone, Args)]
pub(crate) struct NotifyArgs {
    /// MQTT broker host
    #[arg(long, global = true, env = "RFIDGATE_MQTT_HOST", default_value = "localhost")]
    pub(crate) mqtt_host: String,

    /// MQTT broker port
    #[arg(long, global = true, env = "RFIDGATE_MQTT_PORT", default_value_t = 1883)]
    pub(crate) mqtt_port: u16,

    /// Topic that receives "0"/"1" after each status change
    #[arg(
        long,
        global = true,
        env = "RFIDGATE_MQTT_TOPIC",
        default_value = "RFID_LOGIN"
    )]
    pub(crate) mqtt_topic: String,

    /// Upper bound on a single publish, in milliseconds
    #[arg(
        long,
        global = true,
        env = "RFIDGATE_NOTIFY_TIMEOUT_MS",
        default_value_t = 2000
    )]
    pub(crate) notify_timeout_ms: u64,

    /// Do not publish status notifications
    #[arg(long, global = true, env = "RFIDGATE_NO_NOTIFY")]
    pub(crate) no_notify: bool,
}

impl NotifyArgs {
    /// Build the notifier. Must run inside the tokio runtime.
    pub(crate) fn notifier(&self) -> Arc<dyn Notifier> {
        if self.no_notify {
            info!("Status notifications disabled");
            return Arc::new(DisabledNotifier);
        }

        let notifier = MqttNotifier::spawn(MqttSettings {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            topic: self.mqtt_topic.clone(),
            ..MqttSettings::default()
        });
        info!(
            "Publishing status to {}:{} topic {}",
            self.mqtt_host,
            self.mqtt_port,
            notifier.topic()
        );
        Arc::new(notifier)
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

/// Open storage and wire up the workflow.
pub(crate) async fn build_workflow(
    db: &DatabaseArgs,
    notify: &NotifyArgs,
) -> Result<ToggleWorkflow<SqliteStorage>, Box<dyn std::error::Error>> {
    let storage = db.connect().await?;
    Ok(ToggleWorkflow::new(Arc::new(storage), notify.notifier()).with_notify_timeout(notify.timeout()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Flags {
        #[command(flatten)]
        db: DatabaseArgs,
        #[command(flatten)]
        notify: NotifyArgs,
    }

    #[test]
    fn notify_defaults() {
        let flags = Flags::parse_from(["rfidgate"]);
        assert_eq!(flags.notify.mqtt_port, 1883);
        assert_eq!(flags.notify.mqtt_topic, "RFID_LOGIN");
        assert_eq!(flags.notify.timeout(), Duration::from_secs(2));
        assert_eq!(flags.db.max_connections, 5);
    }

    #[test]
    fn flags_override_defaults() {
        let flags = Flags::parse_from([
            "rfidgate",
            "--database-url",
            "sqlite://other.db",
            "--mqtt-host",
            "broker.local",
            "--notify-timeout-ms",
            "250",
            "--no-notify",
        ]);
        assert_eq!(flags.db.database_url, "sqlite://other.db");
        assert_eq!(flags.notify.mqtt_host, "broker.local");
        assert_eq!(flags.notify.timeout(), Duration::from_millis(250));
        assert!(flags.notify.no_notify);
    }

    #[tokio::test]
    async fn disabled_notifier_when_switched_off() {
        let flags = Flags::parse_from(["rfidgate", "--no-notify"]);
        let notifier = flags.notify.notifier();
        assert!(notifier.publish(rfidgate_core::TagStatus::Present).await.is_ok());
    }
}
