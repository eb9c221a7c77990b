use anyhow::Context;
use dotenvy::dotenv;
use log::{info, warn};
use std::path::PathBuf;
use uuid::Uuid;

use supportdesk::analytics::{client_metrics, ServerMetrics};
use supportdesk::core::shared::{TicketCategory, TicketStatus};
use supportdesk::gateway::memory::InMemoryBackend;
use supportdesk::notice::NoticeLevel;
use supportdesk::tickets::audit::AuditTrail;
use supportdesk::tickets::messages::MessageThread;
use supportdesk::tickets::submit::{SubmitOutcome, TicketForm};
use supportdesk::tickets::{ui, TicketReadModel};
use supportdesk::{Identity, Session, SyncConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SyncConfig::load(config_path.as_deref()).context("Failed to load sync config")?;
    info!("Starting support desk walkthrough with {:?}", config);

    let backend = InMemoryBackend::new();
    let customer_id = Uuid::new_v4();
    let admin_id = Uuid::new_v4();
    let customer = Session::signed_in(
        backend.gateway_for(Some(customer_id)),
        config.clone(),
        Identity::customer(customer_id),
    );
    let admin = Session::signed_in(
        backend.gateway_for(Some(admin_id)),
        config,
        Identity::admin(admin_id),
    );

    let mut notices = customer.notices().subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice.level {
                NoticeLevel::Success => info!("[customer] {}", notice.message),
                NoticeLevel::Error => warn!("[customer] {}", notice.message),
            }
        }
    });

    let mut my_tickets = TicketReadModel::activate_for(customer.clone()).await?;
    let mut queue = TicketReadModel::activate_for(admin.clone()).await?;
    let mut metrics = ServerMetrics::activate(admin.clone()).await;
    my_tickets.settle().await;
    queue.settle().await;
    metrics.settle().await;

    let mut form = TicketForm::new(customer.clone());
    form.category = Some(TicketCategory::Payment);
    println!("{}", ui::render_category_options(form.category.as_ref()));
    form.description = "My card was charged twice for the same order".to_string();
    if form.submit().await != SubmitOutcome::Created {
        anyhow::bail!("ticket submission failed");
    }
    let ticket_id = form
        .last_created()
        .map(|t| t.id)
        .context("backend returned no ticket row")?;

    if my_tickets.refresh_on(form.refresh_key()) {
        my_tickets.settle().await;
    }
    queue.process_pending();
    metrics.process_pending().await;
    info!("Customer sees {} ticket(s)", my_tickets.tickets().len());
    println!("{}", ui::render_partitions(queue.partitions(), queue.loading()));

    let mut thread = MessageThread::activate(customer.clone(), ticket_id).await;
    thread.settle().await;
    thread.set_draft("The duplicate charge is from yesterday evening.");
    thread.send().await;
    thread.process_pending();
    for message in thread.messages() {
        println!("{}", ui::render_message(message, customer.user_id()));
    }

    let mut history = AuditTrail::activate_default(admin.clone(), ticket_id).await;
    history.settle().await;

    queue.select(ticket_id);
    queue.change_status(ticket_id, TicketStatus::Resolved).await;
    my_tickets.process_pending();
    history.process_pending();
    metrics.process_pending().await;

    for entry in history.entries() {
        println!("{}", ui::render_audit_entry(entry));
    }
    println!("{}", ui::render_metrics(&metrics.state()));
    println!("{}", ui::render_metrics(&client_metrics(&queue)));

    thread.deactivate().await;
    history.deactivate().await;
    metrics.deactivate().await;
    my_tickets.deactivate().await;
    queue.deactivate().await;

    info!(
        "Walkthrough finished, {} subscription(s) left open",
        backend.active_subscriptions().await
    );
    Ok(())
}
