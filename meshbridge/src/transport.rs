use std::{collections::HashMap, future::Future, sync::Arc};

use tokio::sync::{Mutex, mpsc::UnboundedSender};

use crate::{MqttConnection, PublishEvent, PublishOpts, Result};

/// Message transport the discovery engine publishes through.
pub trait Transport: Send + Sync + 'static {
    fn publish(
        &self,
        topic: &str,
        payload: &str,
        opts: PublishOpts,
    ) -> impl Future<Output = Result<()>> + Send;

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<()>> + Send;

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<()>> + Send;
}

pub struct MqttTransport {
    conn: Arc<MqttConnection>,
    tx: UnboundedSender<PublishEvent>,
    subscriptions: Mutex<HashMap<String, u32>>,
}

impl MqttTransport {
    pub fn new(conn: Arc<MqttConnection>, tx: UnboundedSender<PublishEvent>) -> Self {
        Self { conn, tx, subscriptions: Mutex::new(HashMap::new()) }
    }

    pub fn connection(&self) -> &Arc<MqttConnection> {
        &self.conn
    }
}

impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: &str, opts: PublishOpts) -> Result<()> {
        self.conn.publish(topic, payload.to_owned(), opts).await
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let tx = self.tx.clone();
        let sub_id = self
            .conn
            .subscribe_with_handler(topic, Box::new(move |event| tx.send(event).is_ok()))
            .await?;

        if let Some(previous) = self.subscriptions.lock().await.insert(topic.to_owned(), sub_id) {
            self.conn.remove_handler(previous).await;
        }

        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        let sub_id = self.subscriptions.lock().await.remove(topic);

        match sub_id {
            Some(sub_id) => {
                self.conn.unsubscribe(topic).await?;
                self.conn.remove_handler(sub_id).await;
            }
            None => tracing::debug!("Not subscribed to topic '{topic}'"),
        }

        Ok(())
    }
}
