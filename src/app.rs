// The central application controller and event loop.

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::Backend};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod api;
pub mod model;
pub mod push;
pub mod state;
pub mod ui;

use api::ServiceApi;
use model::{ServiceAction, ServiceCollection};
use push::PushConfig;
use state::{Action, Effect, Route, ViewState};

/// Why the view stopped running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewExit {
    Quit,
    Navigate(Route),
}

pub struct App {
    api: Arc<dyn ServiceApi>,
    push: PushConfig,
    state: ViewState,
}

impl App {
    pub fn new(api: Arc<dyn ServiceApi>, push: PushConfig) -> Self {
        Self {
            api,
            push,
            state: ViewState::default(),
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Loads the service collection; the view starts from this snapshot.
    pub async fn activate(&mut self) -> Result<()> {
        let services = self
            .api
            .list_services()
            .await
            .context("Failed to fetch services")?;
        let services = ServiceCollection::new(services);
        if services.is_empty() {
            tracing::warn!("service manager reported no services");
        }
        tracing::info!(count = services.len(), "loaded services");
        self.state = ViewState::new(services);
        Ok(())
    }

    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<ViewExit> {
        self.activate().await?;
        terminal.draw(|f| ui::render(f, self.state()))?;

        let (push_tx, mut push_rx) = mpsc::channel(16);
        let subscription = push::subscribe(&self.push, push_tx);

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut events = EventStream::new();

        let exit = loop {
            let action = tokio::select! {
                event = events.next() => match event {
                    Some(Ok(Event::Key(key))) => self.action_for_key(key),
                    Some(Ok(_)) => None,
                    Some(Err(e)) => break Err(anyhow::Error::from(e)),
                    None => break Ok(ViewExit::Quit),
                },
                Some(batch) = push_rx.recv() => Some(Action::StatusBatch(batch)),
                Some(done) = done_rx.recv() => Some(done),
            };

            if let Some(action) = action {
                if let Some(exit) = self.dispatch(action, &done_tx) {
                    break Ok(exit);
                }
            }

            if let Err(e) = terminal.draw(|f| ui::render(f, self.state())) {
                break Err(anyhow::Error::from(e));
            }
        };

        subscription.close().await;
        exit
    }

    /// Applies an action and runs the effect it produces.
    pub fn dispatch(
        &mut self,
        action: Action,
        done: &mpsc::UnboundedSender<Action>,
    ) -> Option<ViewExit> {
        match self.state.update(action)? {
            Effect::Control { name, action } => {
                let _ = self.spawn_control(name, action, done.clone());
                None
            }
            Effect::Navigate(route) => {
                tracing::info!(%route, "leaving services view");
                Some(ViewExit::Navigate(route))
            }
            Effect::Quit => Some(ViewExit::Quit),
        }
    }

    fn spawn_control(
        &self,
        name: String,
        action: ServiceAction,
        done: mpsc::UnboundedSender<Action>,
    ) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            let result = api
                .control_service(&name, action)
                .await
                .map_err(|e| {
                    tracing::warn!(service = %name, action = action.as_str(), error = %e, "service command failed");
                    e.user_message()
                });
            // The view may be gone by now.
            let _ = done.send(Action::Completed {
                name,
                action,
                result,
            });
        })
    }

    fn action_for_key(&self, key: KeyEvent) -> Option<Action> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        if self.state.popup().is_some() {
            return match key.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => Some(Action::ClosePopup),
                _ => None,
            };
        }

        let selected = self.state.selected_service();
        let name = || selected.map(|s| s.name.clone());

        match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char(']') | KeyCode::PageDown => Some(Action::NextPage),
            KeyCode::Char('[') | KeyCode::PageUp => Some(Action::PreviousPage),
            KeyCode::Char('p') => Some(Action::CyclePageSize),
            KeyCode::Char('o') => Some(Action::CycleSort),
            KeyCode::Char(' ') | KeyCode::Enter => selected.map(|s| Action::Toggle {
                name: s.name.clone(),
                on: !s.status,
            }),
            KeyCode::Char('s') => name().map(|name| Action::Toggle { name, on: true }),
            KeyCode::Char('x') => name().map(|name| Action::Toggle { name, on: false }),
            KeyCode::Char('r') => name().map(|name| Action::Restart { name }),
            KeyCode::Char('c') => name().map(|name| Action::Configure { name }),
            KeyCode::Char('e') => name().map(|name| Action::ShowError { name }),
            _ => None,
        }
    }
}
