use log::{debug, warn};
use std::collections::VecDeque;

use crate::cascade::{Action, Effect, FilterCascade};
use crate::charts::{ChartPayload, ChartView, Dashboard, split_payload};
use crate::client::{ClientError, FilterApi};
use crate::selection::{Selection, Slot};

/// One open dashboard page: the filter cascade, its charts and the API behind them
///
/// Every user action goes through [`FilterCascade::dispatch`]; the effects it
/// returns are executed here and their results fed back as actions until
/// nothing is left to do.
pub struct DashboardPage<A: FilterApi> {
    api: A,
    dashboard: Dashboard,
    cascade: FilterCascade,
    charts: ChartView,

    /// Number of the latest chart request; older responses are dropped
    chart_seq: u64,
}

impl<A: FilterApi> DashboardPage<A> {
    pub fn new(api: A, dashboard: Dashboard) -> Self {
        DashboardPage {
            api,
            dashboard,
            cascade: FilterCascade::new(),
            charts: ChartView::default(),
            chart_seq: 0,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn dashboard(&self) -> Dashboard {
        self.dashboard
    }

    pub fn cascade(&self) -> &FilterCascade {
        &self.cascade
    }

    pub fn charts(&self) -> &ChartView {
        &self.charts
    }

    pub async fn dispatch(&mut self, action: Action) {
        let effects = self.cascade.dispatch(action);
        self.run(effects).await;
    }

    pub async fn mount(&mut self) {
        self.dispatch(Action::Mount).await;
    }

    pub async fn select(&mut self, slot: Slot, code: Option<String>) {
        self.dispatch(Action::Select(slot, code)).await;
    }

    pub async fn open(&mut self, slot: Slot) {
        self.dispatch(Action::Open(slot)).await;
    }

    pub async fn apply(&mut self) {
        self.dispatch(Action::Apply).await;
    }

    pub async fn clear(&mut self) {
        self.dispatch(Action::Clear).await;
    }

    async fn run(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            let follow_up = match effect {
                Effect::FetchInitial => match self.api.initial().await {
                    Ok(initial) => self.cascade.apply_seed(initial),
                    Err(e) => {
                        warn!("Failed to fetch initial filters: {}", e);
                        self.cascade.seed_failed()
                    }
                },
                Effect::LoadOptions { slot, parent } => {
                    self.load_options(slot, parent).await;
                    Vec::new()
                }
                Effect::FetchCharts(selection) => {
                    self.fetch_charts(selection).await;
                    Vec::new()
                }
            };
            queue.extend(follow_up);
        }
    }

    async fn load_options(&mut self, slot: Slot, parent: Option<String>) {
        match self.api.options(slot, parent.as_deref()).await {
            Ok(items) => {
                debug!("{} {} options loaded", items.len(), slot);
                self.cascade.options_loaded(slot, parent, items);
            }
            Err(e) => {
                warn!("Failed to load {} options: {}", slot, e);
                self.cascade.options_failed(slot, parent);
            }
        }
    }

    /// Start a chart request and return its number
    ///
    /// [`DashboardPage::apply`] and friends await each fetch while holding the
    /// page, so their requests never overlap. A caller that issues requests
    /// itself pairs this with [`DashboardPage::accept_charts`] and gets
    /// last-request-wins ordering.
    pub fn begin_chart_fetch(&mut self) -> u64 {
        self.chart_seq += 1;
        self.charts.begin();
        self.chart_seq
    }

    /// Apply a chart response; returns the detail series still to show
    ///
    /// Responses to anything but the latest request are ignored.
    pub fn accept_charts(&mut self, seq: u64, result: Result<ChartPayload, ClientError>) -> Option<ChartPayload> {
        if seq != self.chart_seq {
            debug!("dropping chart response {} (latest is {})", seq, self.chart_seq);
            return None;
        }

        match result {
            Ok(payload) => {
                let (ringkasan, detail) = split_payload(self.dashboard, payload);
                self.charts.show_summary(ringkasan);
                Some(detail)
            }
            Err(e) => {
                warn!("Failed to fetch {} chart data: {}", self.dashboard, e);
                self.charts.fail();
                None
            }
        }
    }

    async fn fetch_charts(&mut self, selection: Selection) {
        let seq = self.begin_chart_fetch();
        let result = self.api.chart_data(self.dashboard, &selection).await;

        if let Some(detail) = self.accept_charts(seq, result) {
            // summary cards render a tick before the detail charts
            tokio::task::yield_now().await;
            self.charts.show_detail(detail);
        }
    }
}
