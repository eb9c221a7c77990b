use crate::analytics::MetricsState;
use crate::core::shared::{
    AuditLogEntry, Ticket, TicketCategory, TicketMessage, TicketPriority, TicketStatus,
};
use crate::tickets::Partitions;

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

pub fn status_badge(status: &TicketStatus) -> &'static str {
    match status {
        TicketStatus::Pending => "<span class=\"badge badge-warning\">Pending</span>",
        TicketStatus::Open => "<span class=\"badge badge-primary\">Open</span>",
        TicketStatus::InProgress => "<span class=\"badge badge-info\">In Progress</span>",
        TicketStatus::Resolved => "<span class=\"badge badge-success\">Resolved</span>",
        TicketStatus::Unknown(_) => "<span class=\"badge\">Unknown</span>",
    }
}

pub fn priority_badge(priority: Option<&TicketPriority>) -> &'static str {
    match priority {
        Some(TicketPriority::Critical) => "<span class=\"badge badge-danger\">Critical</span>",
        Some(TicketPriority::High) => "<span class=\"badge badge-warning\">High</span>",
        Some(TicketPriority::Medium) => "<span class=\"badge badge-info\">Medium</span>",
        Some(TicketPriority::Low) => "<span class=\"badge badge-secondary\">Low</span>",
        Some(TicketPriority::Unknown(_)) | None => "<span class=\"badge\">Unknown</span>",
    }
}

pub fn render_empty_state(icon: &str, title: &str, description: &str) -> String {
    format!(
        "<div class=\"empty-state\">\
            <div class=\"empty-icon\">{}</div>\
            <h3>{}</h3>\
            <p>{}</p>\
        </div>",
        icon,
        html_escape(title),
        html_escape(description)
    )
}

/// Options for the submission form's category select.
pub fn render_category_options(selected: Option<&TicketCategory>) -> String {
    let placeholder = if selected.is_none() { " selected" } else { "" };
    let mut html = format!(
        "<option value=\"\" disabled{}>Select a category</option>",
        placeholder
    );
    for category in &TicketCategory::ALL {
        let marker = if selected == Some(category) { " selected" } else { "" };
        html.push_str(&format!(
            "<option value=\"{value}\"{marker}>{value}</option>",
            value = html_escape(category.as_str()),
            marker = marker,
        ));
    }
    html
}

fn render_loading(label: &str) -> String {
    format!(
        "<div class=\"loading-placeholder\" aria-busy=\"true\">{}</div>",
        html_escape(label)
    )
}

pub fn render_ticket_row(ticket: &Ticket) -> String {
    let created = ticket.created_at.format("%Y-%m-%d %H:%M").to_string();

    format!(
        "<tr class=\"ticket-row\" data-id=\"{id}\">\
            <td class=\"ticket-category\">{category}</td>\
            <td class=\"ticket-description\">{description}</td>\
            <td class=\"ticket-status\">{status}</td>\
            <td class=\"ticket-priority\">{priority}</td>\
            <td class=\"ticket-created\">{created}</td>\
        </tr>",
        id = ticket.id,
        category = html_escape(ticket.category.as_str()),
        description = html_escape(&ticket.description),
        status = status_badge(&ticket.status),
        priority = priority_badge(ticket.priority.as_ref()),
        created = created,
    )
}

pub fn render_ticket_table(tickets: &[Ticket], loading: bool) -> String {
    if loading {
        return render_loading("Loading tickets...");
    }
    if tickets.is_empty() {
        return render_empty_state(
            "📋",
            "No tickets yet",
            "Submit a ticket above to get started.",
        );
    }

    let rows: String = tickets.iter().map(render_ticket_row).collect();
    format!(
        "<table class=\"ticket-table\">\
            <thead><tr>\
                <th>Category</th><th>Description</th><th>Status</th><th>Priority</th><th>Created</th>\
            </tr></thead>\
            <tbody>{}</tbody>\
        </table>",
        rows
    )
}

/// Active tickets first, then the collapsible archive with its own count.
pub fn render_partitions(partitions: &Partitions, loading: bool) -> String {
    if loading {
        return render_loading("Loading tickets...");
    }

    let active = if partitions.open.is_empty() {
        render_empty_state("✅", "All caught up", "There are no active tickets.")
    } else {
        render_ticket_table(&partitions.open, false)
    };

    format!(
        "<section class=\"tickets-active\">{active}</section>\
        <details class=\"tickets-archive\">\
            <summary>Archive ({count})</summary>\
            {archive}\
        </details>",
        active = active,
        count = partitions.resolved.len(),
        archive = render_ticket_table(&partitions.resolved, false),
    )
}

pub fn render_message(message: &TicketMessage, viewer: Option<uuid::Uuid>) -> String {
    let class = if Some(message.sender_id) == viewer {
        "message message-own"
    } else {
        "message"
    };
    format!(
        "<div class=\"{class}\" data-id=\"{id}\">\
            <p class=\"message-body\">{body}</p>\
            <span class=\"message-time\">{time}</span>\
        </div>",
        class = class,
        id = message.id,
        body = html_escape(&message.body),
        time = message.created_at.format("%H:%M"),
    )
}

pub fn render_audit_entry(entry: &AuditLogEntry) -> String {
    let transition = match &entry.old_status {
        Some(old) => format!(
            "Status changed from {} to {}",
            status_badge(old),
            status_badge(&entry.new_status)
        ),
        None => format!("Ticket created as {}", status_badge(&entry.new_status)),
    };
    format!(
        "<li class=\"audit-entry\" data-id=\"{id}\">\
            {transition}\
            <span class=\"audit-time\">{time}</span>\
        </li>",
        id = entry.id,
        transition = transition,
        time = entry.created_at.format("%Y-%m-%d %H:%M"),
    )
}

pub fn render_metrics(state: &MetricsState) -> String {
    let Some(snapshot) = state.snapshot.as_ref().filter(|_| !state.loading) else {
        return render_loading("Loading analytics...");
    };

    let breakdown = if snapshot.has_open_tickets() {
        let items: String = snapshot
            .category_breakdown()
            .iter()
            .map(|c| {
                format!(
                    "<li class=\"category-item\">\
                        <span class=\"category-name\">{}</span>\
                        <span class=\"category-count\">{}</span>\
                    </li>",
                    html_escape(&c.category),
                    c.count
                )
            })
            .collect();
        format!("<ul class=\"category-breakdown\">{}</ul>", items)
    } else {
        render_empty_state("📭", "No open tickets.", "")
    };

    format!(
        "<div class=\"stats-grid\">\
            <div class=\"stat-card stat-open\">\
                <div class=\"stat-value\">{}</div>\
                <div class=\"stat-label\">Open Tickets</div>\
            </div>\
            <div class=\"stat-card stat-resolved\">\
                <div class=\"stat-value\">{}</div>\
                <div class=\"stat-label\">Resolved Today</div>\
            </div>\
        </div>\
        {}",
        snapshot.open_total, snapshot.resolved_today, breakdown
    )
}
