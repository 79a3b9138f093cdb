use async_trait::async_trait;
use irregular_models::reminder::Reminder;

/// Where a fired reminder ends up. Push transport lives behind this.
#[async_trait]
pub trait ReminderDeliveryChannel: Send + Sync + 'static {
    async fn send_reminder_notification(&self, reminder: &Reminder) -> anyhow::Result<()>;
}

/// Writes the notification to the log instead of a device.
pub struct LogDeliveryChannel;

#[async_trait]
impl ReminderDeliveryChannel for LogDeliveryChannel {
    async fn send_reminder_notification(&self, reminder: &Reminder) -> anyhow::Result<()> {
        log::info!(
            "[DELIVER] {}: {} [reminder_id = {}, device_id = {}]",
            reminder.title,
            reminder.message,
            reminder.id,
            reminder.device_id
        );
        Ok(())
    }
}
