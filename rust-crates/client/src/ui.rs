use crate::client::AppView;
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use joint_client::{
    ConnectionState,
    PendingTx,
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;

pub type InputEvents = EventStream;

pub enum UserEvent {
    Quit,
    Connect,
    Lock,
    Yoink,
    OpenTransferModal,
    ConfirmTransfer(String),
    RefreshHistory,
    RefreshNow,
    Redraw,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    TransferModal(String),
}

pub fn input_event_stream() -> InputEvents {
    EventStream::new()
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // One persistent Terminal so buffers survive across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit(state: &mut UiState) -> Result<()> {
    state.terminal = None;
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, view: &AppView) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, view))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Waits for the next key press that maps to an action.
pub async fn next_event(state: &mut UiState, events: &mut InputEvents) -> Result<UserEvent> {
    loop {
        let event = events
            .next()
            .await
            .ok_or_else(|| eyre!("terminal input closed"))??;
        let k = match event {
            Event::Key(k) => k,
            Event::Resize(..) => return Ok(UserEvent::Redraw),
            _ => continue,
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }
        // raw mode swallows SIGINT
        if k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(UserEvent::Quit);
        }
        if let Mode::TransferModal(input) = &mut state.mode {
            match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    return Ok(UserEvent::Redraw);
                }
                KeyCode::Enter => {
                    let target = input.trim().to_string();
                    state.mode = Mode::Normal;
                    return Ok(UserEvent::ConfirmTransfer(target));
                }
                KeyCode::Backspace => {
                    input.pop();
                    return Ok(UserEvent::Redraw);
                }
                KeyCode::Char(c) if !c.is_control() && input.len() < 64 => {
                    input.push(c);
                    return Ok(UserEvent::Redraw);
                }
                _ => continue,
            }
        }
        return Ok(match k.code {
            KeyCode::Char('q') | KeyCode::Esc => UserEvent::Quit,
            KeyCode::Char('c') => UserEvent::Connect,
            KeyCode::Char('l') => UserEvent::Lock,
            KeyCode::Char('y') => UserEvent::Yoink,
            KeyCode::Char('t') => {
                state.mode = Mode::TransferModal(String::new());
                UserEvent::OpenTransferModal
            }
            KeyCode::Char('h') => UserEvent::RefreshHistory,
            KeyCode::Char('r') => UserEvent::RefreshNow,
            _ => continue,
        });
    }
}

/// `{h}h {m}m {s}s`, or the ready message once the cooldown is over.
pub fn format_cooldown(seconds: u64) -> String {
    if seconds == 0 {
        return "The joint is yoinkable now!".to_string();
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("Time Until Yoinkable: {hours}h {minutes}m {secs}s")
}

fn ui(f: &mut Frame, state: &UiState, view: &AppView) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // wallet
            Constraint::Length(5), // timer + holder
            Constraint::Min(6),    // tokens + past holders
            Constraint::Length(8), // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], view);
    draw_joint_panels(f, chunks[1], view);
    draw_lists(f, chunks[2], view);
    draw_status(f, chunks[3], view);
    let help = Paragraph::new(
        "c connect | l lock wallet | y yoink | t yoink to address | h history | r refresh | q/Esc quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[4]);
    draw_modals(f, state);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, view: &AppView) {
    let (text, color) = match &view.connection {
        ConnectionState::Disconnected => ("Not connected (press c)".to_string(), Color::Gray),
        ConnectionState::Connecting => ("Connecting...".to_string(), Color::Yellow),
        ConnectionState::Connected { account, chain_id } => {
            (format!("{account} on chain {chain_id}"), Color::Green)
        }
        ConnectionState::Failed { reason } => (reason.clone(), Color::Red),
    };
    let wallet = view.wallet_name.as_deref().unwrap_or("none");
    let title = format!("Wallet [{wallet}] | {} | {}", view.network, view.contract);
    let widget = Paragraph::new(text)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(widget, area);
}

fn draw_joint_panels(f: &mut Frame, area: Rect, view: &AppView) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let timer = match &view.snapshot {
        Some(snap) => {
            let style = if snap.is_yoinkable() {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::styled(format_cooldown(snap.cooldown_secs), style)
        }
        None => Line::from("Loading..."),
    };
    let mut timer_lines = vec![timer];
    for (slot, pending) in &view.pending {
        match pending {
            PendingTx::Idle => {}
            PendingTx::Submitted => {
                timer_lines.push(Line::styled(
                    format!("{slot}: waiting for confirmation"),
                    Style::default().fg(Color::Yellow),
                ));
            }
            PendingTx::Confirmed(hash) => {
                timer_lines.push(Line::from(format!("{slot}: confirmed {hash}")));
            }
            PendingTx::Failed(reason) => {
                timer_lines.push(Line::styled(
                    format!("{slot}: {reason}"),
                    Style::default().fg(Color::Red),
                ));
            }
        }
    }
    let timer_widget = Paragraph::new(timer_lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Timer"));
    f.render_widget(timer_widget, cols[0]);

    let mut holder_lines = Vec::new();
    if let Some(snap) = &view.snapshot {
        holder_lines.push(Line::from(format!("Current holder: {}", snap.holder)));
        if let Some(account) = view.connection.account() {
            if snap.is_held_by(account) {
                holder_lines.push(Line::styled(
                    "You are holding the joint",
                    Style::default().fg(Color::Green),
                ));
            } else {
                holder_lines.push(Line::from("Not holding the joint"));
            }
        }
    }
    let holder_widget = Paragraph::new(holder_lines)
        .block(Block::default().borders(Borders::ALL).title("The JOINT"));
    f.render_widget(holder_widget, cols[1]);
}

fn draw_lists(f: &mut Frame, area: Rect, view: &AppView) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let account = view.connection.account();
    let tokens: Vec<ListItem> = view
        .snapshot
        .iter()
        .flat_map(|snap| snap.tokens.iter())
        .map(|t| {
            let line = format!("#{} token {} owner {}", t.index, t.token_id, t.owner);
            if Some(t.owner) == account {
                ListItem::new(line).style(Style::default().fg(Color::Cyan))
            } else {
                ListItem::new(line)
            }
        })
        .collect();
    let token_title = match (&view.snapshot, account) {
        (Some(snap), Some(account)) => format!(
            "Tokens ({}, yours {})",
            snap.tokens.len(),
            snap.owned_by(account).count()
        ),
        (Some(snap), None) => format!("Tokens ({})", snap.tokens.len()),
        (None, _) => "Tokens".to_string(),
    };
    let token_list =
        List::new(tokens).block(Block::default().borders(Borders::ALL).title(token_title));
    f.render_widget(token_list, cols[0]);

    let holders: Vec<ListItem> = view
        .past_holders
        .iter()
        .map(|h| ListItem::new(h.to_string()))
        .collect();
    let holder_list = List::new(holders)
        .block(Block::default().borders(Borders::ALL).title("Past Holders"));
    f.render_widget(holder_list, cols[1]);
}

fn draw_status(f: &mut Frame, area: Rect, view: &AppView) {
    let widget = if view.errors.is_empty() {
        let status = if view.status.trim().is_empty() {
            "Ready"
        } else {
            view.status.as_str()
        };
        Paragraph::new(status.to_string())
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let lines: Vec<Line> = view
            .errors
            .iter()
            .rev()
            .map(|e| Line::from(e.clone()))
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Errors | {}", view.status)),
            )
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(widget, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    if let Mode::TransferModal(input) = &state.mode {
        let area = centered_rect(60, 20, f.area());
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Yoink To Address");
        let p = Paragraph::new(format!(
            "Recipient: {input}_\nEnter=confirm Esc=cancel"
        ));
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn format_cooldown__splits_hours_minutes_seconds() {
        assert_eq!(format_cooldown(3725), "Time Until Yoinkable: 1h 2m 5s");
        assert_eq!(format_cooldown(59), "Time Until Yoinkable: 0h 0m 59s");
    }

    #[test]
    fn format_cooldown__zero_means_yoinkable() {
        assert_eq!(format_cooldown(0), "The joint is yoinkable now!");
    }
}
