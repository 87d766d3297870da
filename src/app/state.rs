// View state container and the transitions that drive it.

use super::model::{
    RowStatus, Service, ServiceAction, ServiceCollection, StatusBatch, is_configurable,
};
use std::collections::HashMap;
use std::fmt;

/// Client-side route emitted when leaving the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route(String);

impl Route {
    pub fn edit_service(name: &str) -> Self {
        Route(format!("services/{}/edit", name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything that can happen to the view, from the operator or the network.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Toggle { name: String, on: bool },
    Restart { name: String },
    Configure { name: String },
    ShowError { name: String },
    ClosePopup,
    StatusBatch(StatusBatch),
    Completed {
        name: String,
        action: ServiceAction,
        result: Result<(), String>,
    },
    SelectNext,
    SelectPrevious,
    NextPage,
    PreviousPage,
    CyclePageSize,
    CycleSort,
    Quit,
}

/// Side effects requested by a transition; executed by the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Control { name: String, action: ServiceAction },
    Navigate(Route),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    Fifteen,
    Thirty,
    FortyFive,
    All,
}

impl PageSize {
    /// Rows per page for a table of `total` rows.
    pub fn rows(self, total: usize) -> usize {
        match self {
            PageSize::Fifteen => 15,
            PageSize::Thirty => 30,
            PageSize::FortyFive => 45,
            PageSize::All => total.max(1),
        }
    }

    pub fn next(self) -> Self {
        match self {
            PageSize::Fifteen => PageSize::Thirty,
            PageSize::Thirty => PageSize::FortyFive,
            PageSize::FortyFive => PageSize::All,
            PageSize::All => PageSize::Fifteen,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PageSize::Fifteen => "15",
            PageSize::Thirty => "30",
            PageSize::FortyFive => "45",
            PageSize::All => "All",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sort {
    #[default]
    ServerOrder,
    NameAsc,
    NameDesc,
    RunningFirst,
    StoppedFirst,
}

impl Sort {
    pub fn next(self) -> Self {
        match self {
            Sort::ServerOrder => Sort::NameAsc,
            Sort::NameAsc => Sort::NameDesc,
            Sort::NameDesc => Sort::RunningFirst,
            Sort::RunningFirst => Sort::StoppedFirst,
            Sort::StoppedFirst => Sort::ServerOrder,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Sort::ServerOrder => "default",
            Sort::NameAsc => "name ▲",
            Sort::NameDesc => "name ▼",
            Sort::RunningFirst => "running first",
            Sort::StoppedFirst => "stopped first",
        }
    }
}

/// The slice of the table currently on screen.
pub struct PageView<'a> {
    pub rows: Vec<&'a Service>,
    pub page: usize,
    pub page_count: usize,
    pub selected: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ViewState {
    services: ServiceCollection,
    rows: HashMap<String, RowStatus>,
    selected: Option<String>,
    page_size: PageSize,
    sort: Sort,
    popup: Option<String>,
    flash: Option<String>,
}

impl ViewState {
    pub fn new(services: ServiceCollection) -> Self {
        let rows = services
            .iter()
            .map(|s| (s.name.clone(), RowStatus::Idle))
            .collect();
        let selected = services.iter().next().map(|s| s.name.clone());
        Self {
            services,
            rows,
            selected,
            ..Self::default()
        }
    }

    pub fn services(&self) -> &ServiceCollection {
        &self.services
    }

    pub fn indicator(&self, name: &str) -> Option<&RowStatus> {
        self.rows.get(name)
    }

    pub fn selected_service(&self) -> Option<&Service> {
        self.selected.as_deref().and_then(|name| self.services.get(name))
    }

    /// Name of the service whose error popup is open.
    pub fn popup(&self) -> Option<&str> {
        self.popup.as_deref()
    }

    pub fn popup_message(&self) -> Option<&str> {
        match self.rows.get(self.popup.as_deref()?)? {
            RowStatus::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn flash(&self) -> Option<&str> {
        self.flash.as_deref()
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    /// All services in display order.
    pub fn ordered(&self) -> Vec<&Service> {
        let mut services: Vec<&Service> = self.services.iter().collect();
        match self.sort {
            Sort::ServerOrder => {}
            Sort::NameAsc => services.sort_by(|a, b| a.label().cmp(b.label())),
            Sort::NameDesc => services.sort_by(|a, b| b.label().cmp(a.label())),
            Sort::RunningFirst => services.sort_by_key(|s| !s.status),
            Sort::StoppedFirst => services.sort_by_key(|s| s.status),
        }
        services
    }

    pub fn page(&self) -> PageView<'_> {
        let ordered = self.ordered();
        let per_page = self.page_size.rows(ordered.len());
        let page_count = ordered.len().div_ceil(per_page).max(1);
        let position = self.selected_position(&ordered);
        let page = position.map_or(0, |p| p / per_page);
        let rows = ordered
            .into_iter()
            .skip(page * per_page)
            .take(per_page)
            .collect();

        PageView {
            rows,
            page,
            page_count,
            selected: position.map(|p| p % per_page),
        }
    }

    fn page_position(&self) -> (usize, usize) {
        let view = self.page();
        (view.page, view.page_count)
    }

    fn selected_position(&self, ordered: &[&Service]) -> Option<usize> {
        let name = self.selected.as_deref()?;
        ordered.iter().position(|s| s.name == name)
    }

    fn select_position(&mut self, position: usize) {
        let ordered = self.ordered();
        self.selected = ordered
            .get(position.min(ordered.len().saturating_sub(1)))
            .map(|s| s.name.clone());
    }

    /// Applies one action; returns the side effect the app must run, if any.
    pub fn update(&mut self, action: Action) -> Option<Effect> {
        match action {
            Action::Toggle { name, on } => {
                let action = if on {
                    ServiceAction::Start
                } else {
                    ServiceAction::Stop
                };
                if !self.services.set_status(&name, on) {
                    return None;
                }
                self.begin(name, action)
            }
            Action::Restart { name } => {
                self.services.get(&name)?;
                self.begin(name, ServiceAction::Restart)
            }
            Action::Configure { name } => {
                if self.services.get(&name).is_some() && is_configurable(&name) {
                    Some(Effect::Navigate(Route::edit_service(&name)))
                } else {
                    None
                }
            }
            Action::ShowError { name } => {
                if matches!(self.rows.get(&name), Some(RowStatus::Error(_))) {
                    self.popup = Some(name);
                }
                None
            }
            Action::ClosePopup => {
                self.popup = None;
                None
            }
            Action::StatusBatch(batch) => {
                let matched = self.services.apply_batch(&batch);
                tracing::debug!(entries = batch.len(), matched, "applied status batch");
                // A full re-render drops error icons; in-flight spinners stay.
                for status in self.rows.values_mut() {
                    if matches!(status, RowStatus::Error(_)) {
                        *status = RowStatus::Idle;
                    }
                }
                self.popup = None;
                None
            }
            Action::Completed {
                name,
                action,
                result,
            } => {
                let Some(row) = self.rows.get_mut(&name) else {
                    return None;
                };
                match result {
                    Ok(()) => {
                        *row = RowStatus::Idle;
                        let label = self.services.get(&name).map_or(name.as_str(), Service::label);
                        self.flash = Some(format!("{} {}", label, action.past_tense()));
                    }
                    Err(message) => *row = RowStatus::Error(message),
                }
                None
            }
            Action::SelectNext => {
                let ordered = self.ordered();
                let next = match self.selected_position(&ordered) {
                    Some(i) if i + 1 < ordered.len() => i + 1,
                    _ => 0,
                };
                self.select_position(next);
                None
            }
            Action::SelectPrevious => {
                let ordered = self.ordered();
                let previous = match self.selected_position(&ordered) {
                    Some(0) | None => ordered.len().saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.select_position(previous);
                None
            }
            Action::NextPage => {
                let (page, page_count) = self.page_position();
                if page + 1 < page_count {
                    let per_page = self.page_size.rows(self.services.len());
                    self.select_position((page + 1) * per_page);
                }
                None
            }
            Action::PreviousPage => {
                let (page, _) = self.page_position();
                let per_page = self.page_size.rows(self.services.len());
                self.select_position(page.saturating_sub(1) * per_page);
                None
            }
            Action::CyclePageSize => {
                self.page_size = self.page_size.next();
                None
            }
            Action::CycleSort => {
                self.sort = self.sort.next();
                None
            }
            Action::Quit => Some(Effect::Quit),
        }
    }

    fn begin(&mut self, name: String, action: ServiceAction) -> Option<Effect> {
        self.rows.insert(name.clone(), RowStatus::Loading);
        if self.popup.as_deref() == Some(name.as_str()) {
            self.popup = None;
        }
        self.flash = None;
        Some(Effect::Control { name, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::model::StatusDescriptor;

    fn state() -> ViewState {
        ViewState::new(ServiceCollection::new([
            Service::new("nis", "NIS", false),
            Service::new("ntpd", "NTP", true),
            Service::new("smb", "Samba", false),
            Service::new("ldap", "LDAP", false),
            Service::new("rockstor", "Rockstor", true),
        ]))
    }

    fn fail(name: &str, action: ServiceAction, message: &str) -> Action {
        Action::Completed {
            name: name.to_string(),
            action,
            result: Err(message.to_string()),
        }
    }

    #[test]
    fn toggle_on_requests_start_and_shows_loading() {
        let mut state = state();
        let effect = state.update(Action::Toggle {
            name: "smb".into(),
            on: true,
        });

        assert_eq!(
            effect,
            Some(Effect::Control {
                name: "smb".into(),
                action: ServiceAction::Start
            })
        );
        assert!(state.services().get("smb").unwrap().status);
        assert_eq!(state.indicator("smb"), Some(&RowStatus::Loading));
    }

    #[test]
    fn toggle_off_requests_stop() {
        let mut state = state();
        let effect = state.update(Action::Toggle {
            name: "ntpd".into(),
            on: false,
        });

        assert_eq!(
            effect,
            Some(Effect::Control {
                name: "ntpd".into(),
                action: ServiceAction::Stop
            })
        );
    }

    #[test]
    fn toggle_of_unknown_service_does_nothing() {
        let mut state = state();
        let effect = state.update(Action::Toggle {
            name: "docker".into(),
            on: true,
        });

        assert_eq!(effect, None);
        assert!(state.indicator("docker").is_none());
    }

    #[test]
    fn failed_stop_marks_only_that_row() {
        let mut state = state();
        state.update(Action::Toggle {
            name: "ntpd".into(),
            on: false,
        });
        state.update(fail("ntpd", ServiceAction::Stop, "ntpd is busy"));

        let errors: Vec<_> = state
            .services()
            .iter()
            .filter(|s| matches!(state.indicator(&s.name), Some(RowStatus::Error(_))))
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(errors, ["ntpd"]);

        state.update(Action::ShowError {
            name: "ntpd".into(),
        });
        assert_eq!(state.popup(), Some("ntpd"));
        assert_eq!(state.popup_message(), Some("ntpd is busy"));
    }

    #[test]
    fn show_error_without_error_keeps_popup_closed() {
        let mut state = state();
        state.update(Action::ShowError { name: "smb".into() });

        assert_eq!(state.popup(), None);
    }

    #[test]
    fn next_successful_action_dismisses_error() {
        let mut state = state();
        state.update(fail("smb", ServiceAction::Start, "boom"));
        state.update(Action::Toggle {
            name: "smb".into(),
            on: true,
        });
        state.update(Action::Completed {
            name: "smb".into(),
            action: ServiceAction::Start,
            result: Ok(()),
        });

        assert_eq!(state.indicator("smb"), Some(&RowStatus::Idle));
        assert_eq!(state.flash(), Some("Samba started"));
    }

    #[test]
    fn status_batch_rerender_clears_errors_but_not_loading() {
        let mut state = state();
        state.update(fail("smb", ServiceAction::Start, "boom"));
        state.update(Action::ShowError { name: "smb".into() });
        state.update(Action::Toggle {
            name: "nis".into(),
            on: true,
        });
        state.update(Action::StatusBatch(StatusBatch::new()));

        assert_eq!(state.indicator("smb"), Some(&RowStatus::Idle));
        assert_eq!(state.indicator("nis"), Some(&RowStatus::Loading));
        assert_eq!(state.popup(), None);
    }

    #[test]
    fn latest_batch_wins() {
        let mut state = state();
        for running in [1, 0, 4, 0] {
            let batch = StatusBatch::from([("nis".to_string(), StatusDescriptor::running(running))]);
            state.update(Action::StatusBatch(batch));
        }

        assert!(!state.services().get("nis").unwrap().status);
        assert!(state.services().get("ntpd").unwrap().status);
    }

    #[test]
    fn configure_navigates_only_for_allow_listed_services() {
        let mut state = state();

        assert_eq!(
            state.update(Action::Configure {
                name: "ldap".into()
            }),
            Some(Effect::Navigate(Route::edit_service("ldap")))
        );
        assert_eq!(
            state.update(Action::Configure {
                name: "rockstor".into()
            }),
            None
        );
        assert_eq!(Route::edit_service("ldap").as_str(), "services/ldap/edit");
    }

    #[test]
    fn restart_requests_restart() {
        let mut state = state();
        let effect = state.update(Action::Restart {
            name: "ntpd".into(),
        });

        assert_eq!(
            effect,
            Some(Effect::Control {
                name: "ntpd".into(),
                action: ServiceAction::Restart
            })
        );
        assert!(state.services().get("ntpd").unwrap().status);
    }

    #[test]
    fn selection_wraps_like_a_list() {
        let mut state = state();
        state.update(Action::SelectPrevious);
        assert_eq!(state.selected_service().unwrap().name, "rockstor");

        state.update(Action::SelectNext);
        assert_eq!(state.selected_service().unwrap().name, "nis");
    }

    #[test]
    fn selection_follows_service_across_sorts() {
        let mut state = state();
        state.update(Action::SelectNext); // ntpd
        state.update(Action::CycleSort); // name asc

        let ordered: Vec<_> = state.ordered().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(ordered, ["ldap", "nis", "ntpd", "rockstor", "smb"]);
        assert_eq!(state.page().selected, Some(2));
    }

    #[test]
    fn running_first_sort_is_stable() {
        let mut state = state();
        state.update(Action::CycleSort);
        state.update(Action::CycleSort);
        state.update(Action::CycleSort);

        assert_eq!(state.sort(), Sort::RunningFirst);
        let ordered: Vec<_> = state.ordered().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(ordered, ["ntpd", "rockstor", "nis", "smb", "ldap"]);
    }

    #[test]
    fn pages_hold_fifteen_rows_by_default() {
        let services = (0..40).map(|i| Service::new(&format!("svc{:02}", i), "", false));
        let mut state = ViewState::new(ServiceCollection::new(services));

        let view = state.page();
        assert_eq!((view.rows.len(), view.page, view.page_count), (15, 0, 3));

        state.update(Action::NextPage);
        state.update(Action::NextPage);
        let view = state.page();
        assert_eq!((view.rows.len(), view.page), (10, 2));
        assert_eq!(view.rows[0].name, "svc30");

        state.update(Action::NextPage);
        assert_eq!(state.page().page, 2);

        state.update(Action::PreviousPage);
        assert_eq!(state.selected_service().unwrap().name, "svc15");
    }

    #[test]
    fn page_size_cycles_through_all() {
        let services = (0..40).map(|i| Service::new(&format!("svc{:02}", i), "", false));
        let mut state = ViewState::new(ServiceCollection::new(services));
        for _ in 0..3 {
            state.update(Action::CyclePageSize);
        }

        assert_eq!(state.page_size(), PageSize::All);
        let view = state.page();
        assert_eq!((view.rows.len(), view.page_count), (40, 1));

        state.update(Action::CyclePageSize);
        assert_eq!(state.page_size(), PageSize::Fifteen);
    }

    #[test]
    fn empty_state_has_one_empty_page() {
        let mut state = ViewState::new(ServiceCollection::default());
        state.update(Action::SelectNext);

        let view = state.page();
        assert!(view.rows.is_empty());
        assert_eq!((view.page_count, view.selected), (1, None));
    }
}
