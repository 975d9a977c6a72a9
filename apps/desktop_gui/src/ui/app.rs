use std::{fs, sync::Arc};

use chrono::{DateTime, Local, Utc};
use client_core::{
    export::{render_report_pdf, report_pdf_filename, rgba_to_rgb},
    load_settings, parse_report, resolve_route, AuthClient, OwnedReport, ReportBlock, Route,
    ViewState, WorkbenchSession, WorkbenchSnapshot,
};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use serde::{Deserialize, Serialize};
use shared::{domain::ReportId, protocol::ReportRow};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{
    classify_sign_in_failure, UiError, UiErrorCategory, UiErrorContext, UiEvent,
};
use crate::controller::orchestration::dispatch_backend_command;

pub const SETTINGS_STORAGE_KEY: &str = "polyinsights.settings";

const SIGN_IN_REDIRECT: &str = "polyinsights://callback";

// Frames to wait for a requested screen capture (~100ms repaint cadence)
// before giving the export flow up as lost.
const EXPORT_CAPTURE_FRAME_BUDGET: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusBannerSeverity {
    Error,
}

#[derive(Debug, Clone)]
struct StatusBanner {
    severity: StatusBannerSeverity,
    message: String,
}

fn err_label(category: UiErrorCategory) -> &'static str {
    match category {
        UiErrorCategory::Auth => "Authentication",
        UiErrorCategory::Transport => "Transport",
        UiErrorCategory::Validation => "Validation",
        UiErrorCategory::Unknown => "Unexpected",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedAppSettings {
    text_scale: f32,
    access_token: String,
}

impl Default for PersistedAppSettings {
    fn default() -> Self {
        Self {
            text_scale: 1.0,
            access_token: String::new(),
        }
    }
}

fn idle_snapshot() -> WorkbenchSnapshot {
    WorkbenchSnapshot {
        state: ViewState::Idle,
        session: WorkbenchSession::default(),
        error_message: String::new(),
    }
}

pub struct PolyInsightsApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,

    route: Route,
    signed_in: bool,
    user_email: String,
    access_token: String,

    status: String,
    status_banner: Option<StatusBanner>,

    // Landing teaser.
    landing_question: String,
    preview_text: Option<String>,
    preview_error: Option<String>,
    preview_loading: bool,

    // Sign-in. `auth_links` only builds authorize URLs; all network calls go
    // through the backend worker.
    sign_in_code: String,
    sign_in_busy: bool,
    auth_links: Option<AuthClient>,

    // Workbench.
    workbench_question: String,
    workbench: WorkbenchSnapshot,

    dashboard_reports: Vec<OwnedReport>,
    dashboard_loading: bool,
    history_reports: Vec<OwnedReport>,
    history_loading: bool,

    selected_report: Option<ReportId>,
    report_detail: Option<(ReportRow, String)>,
    report_detail_missing: bool,
    report_detail_loading: bool,

    // PDF export: set while a screenshot round trip is pending so a second
    // click cannot start an overlapping export.
    exporting: bool,
    exporting_frames: u32,
    report_rect: Option<egui::Rect>,

    text_scale: f32,
    applied_text_scale: Option<f32>,

    tick: u64,
}

impl PolyInsightsApp {
    pub fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        persisted: Option<PersistedAppSettings>,
    ) -> Self {
        let persisted = persisted.unwrap_or_default();
        let auth_links = load_settings().auth_client().ok();

        let mut app = Self {
            cmd_tx,
            ui_rx,
            route: Route::Landing,
            signed_in: false,
            user_email: String::new(),
            access_token: String::new(),
            status: "Not signed in".to_string(),
            status_banner: None,
            landing_question: String::new(),
            preview_text: None,
            preview_error: None,
            preview_loading: false,
            sign_in_code: String::new(),
            sign_in_busy: false,
            auth_links,
            workbench_question: String::new(),
            workbench: idle_snapshot(),
            dashboard_reports: Vec::new(),
            dashboard_loading: false,
            history_reports: Vec::new(),
            history_loading: false,
            selected_report: None,
            report_detail: None,
            report_detail_missing: false,
            report_detail_loading: false,
            exporting: false,
            exporting_frames: 0,
            report_rect: None,
            text_scale: persisted.text_scale.clamp(0.8, 1.4),
            applied_text_scale: None,
            tick: 0,
        };

        if !persisted.access_token.is_empty() {
            app.status = "Restoring session...".to_string();
            dispatch_backend_command(
                &app.cmd_tx,
                BackendCommand::RestoreSession {
                    access_token: persisted.access_token,
                },
                &mut app.status,
            );
        }
        app
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::SignedIn { session } => {
                    self.signed_in = true;
                    self.sign_in_busy = false;
                    self.sign_in_code.clear();
                    self.user_email = session.user.email;
                    self.access_token = session.access_token;
                    self.status = format!("Signed in as {}", self.user_email);
                    self.status_banner = None;
                    self.navigate_dashboard();
                }
                UiEvent::SessionRestoreFailed => {
                    self.access_token.clear();
                    self.status = "Not signed in".to_string();
                }
                UiEvent::SignedOut => {
                    self.signed_in = false;
                    self.user_email.clear();
                    self.access_token.clear();
                    self.workbench = idle_snapshot();
                    self.workbench_question.clear();
                    self.dashboard_reports.clear();
                    self.history_reports.clear();
                    self.report_detail = None;
                    self.selected_report = None;
                    self.route = Route::Landing;
                    self.status = "Signed out".to_string();
                }
                UiEvent::Workbench(snapshot) => {
                    self.workbench = snapshot;
                }
                UiEvent::PreviewLoaded(preview) => {
                    self.preview_loading = false;
                    self.preview_error = None;
                    self.preview_text = Some(preview);
                }
                UiEvent::PreviewFailed(reason) => {
                    self.preview_loading = false;
                    self.preview_text = None;
                    self.preview_error = Some(reason);
                }
                UiEvent::DashboardLoaded(reports) => {
                    self.dashboard_loading = false;
                    self.dashboard_reports = reports;
                }
                UiEvent::HistoryLoaded(reports) => {
                    self.history_loading = false;
                    self.history_reports = reports;
                }
                UiEvent::ReportDetailLoaded { report, question } => {
                    self.report_detail_loading = false;
                    self.report_detail_missing = false;
                    self.report_detail = Some((report, question));
                }
                UiEvent::ReportDetailMissing => {
                    self.report_detail_loading = false;
                    self.report_detail = None;
                    self.report_detail_missing = true;
                }
                UiEvent::Error(err) => self.handle_error(err),
            }
        }
    }

    fn handle_error(&mut self, err: UiError) {
        if err.context() == UiErrorContext::SignIn {
            self.sign_in_busy = false;
        }
        self.dashboard_loading = false;
        self.history_loading = false;
        self.report_detail_loading = false;

        if err.requires_reauth() {
            self.signed_in = false;
            self.access_token.clear();
            self.route = Route::SignIn;
            self.status = format!("Authentication error: {}", err.message());
            self.status_banner = Some(StatusBanner {
                severity: StatusBannerSeverity::Error,
                message: "Session expired. Please sign in again.".to_string(),
            });
        } else {
            self.status = if err.context() == UiErrorContext::SignIn {
                classify_sign_in_failure(err.message())
            } else {
                format!("{} error: {}", err_label(err.category()), err.message())
            };
            if matches!(
                err.context(),
                UiErrorContext::SignIn | UiErrorContext::BackendStartup | UiErrorContext::Workbench
            ) {
                self.status_banner = Some(StatusBanner {
                    severity: StatusBannerSeverity::Error,
                    message: self.status.clone(),
                });
            }
        }
    }

    // ---------------- navigation ----------------

    fn navigate_dashboard(&mut self) {
        self.route = Route::Dashboard;
        self.dashboard_loading = true;
        dispatch_backend_command(&self.cmd_tx, BackendCommand::LoadDashboard, &mut self.status);
    }

    fn navigate_history(&mut self) {
        self.route = Route::History;
        self.history_loading = true;
        dispatch_backend_command(&self.cmd_tx, BackendCommand::LoadHistory, &mut self.status);
    }

    fn open_report_detail(&mut self, report_id: ReportId) {
        self.route = Route::ReportDetail;
        self.selected_report = Some(report_id);
        self.report_detail = None;
        self.report_detail_missing = false;
        self.report_detail_loading = true;
        dispatch_backend_command(
            &self.cmd_tx,
            BackendCommand::LoadReportDetail { report_id },
            &mut self.status,
        );
    }

    // ---------------- chrome ----------------

    fn apply_text_scale_if_needed(&mut self, ctx: &egui::Context) {
        if self.applied_text_scale == Some(self.text_scale) {
            return;
        }
        let mut style = (*ctx.style()).clone();
        let mut text_styles = egui::Style::default().text_styles;
        for font in text_styles.values_mut() {
            font.size *= self.text_scale;
        }
        style.text_styles = text_styles;
        ctx.set_style(style);
        self.applied_text_scale = Some(self.text_scale);
    }

    fn show_top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("nav_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("PolyInsights");
                ui.separator();
                if self.signed_in {
                    if ui.button("Dashboard").clicked() {
                        self.navigate_dashboard();
                    }
                    if ui.button("History").clicked() {
                        self.navigate_history();
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.signed_in {
                        if ui.button("Sign out").clicked() {
                            dispatch_backend_command(
                                &self.cmd_tx,
                                BackendCommand::SignOut,
                                &mut self.status,
                            );
                        }
                        ui.weak(self.user_email.clone());
                    } else if ui.button("Sign in").clicked() {
                        self.route = Route::SignIn;
                    }
                    ui.add(
                        egui::Slider::new(&mut self.text_scale, 0.8..=1.4)
                            .text("Text")
                            .step_by(0.05),
                    );
                });
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.small("Status:");
                ui.small(egui::RichText::new(&self.status).weak());
            });
        });
    }

    fn show_status_banner(&mut self, ui: &mut egui::Ui) {
        if let Some(banner) = self.status_banner.clone() {
            let (fill, stroke) = match banner.severity {
                StatusBannerSeverity::Error => (
                    egui::Color32::from_rgb(111, 53, 53),
                    egui::Stroke::new(1.0, egui::Color32::from_rgb(175, 96, 96)),
                ),
            };
            egui::Frame::NONE
                .fill(fill)
                .stroke(stroke)
                .corner_radius(8.0)
                .inner_margin(egui::Margin::symmetric(10, 8))
                .show(ui, |ui| {
                    ui.horizontal_wrapped(|ui| {
                        ui.label(egui::RichText::new(&banner.message).color(egui::Color32::WHITE));
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("Dismiss").clicked() {
                                self.status_banner = None;
                            }
                        });
                    });
                });
        }
    }

    // ---------------- pages ----------------

    fn show_landing(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(24.0);
            ui.vertical_centered(|ui| {
                ui.set_max_width(620.0);
                ui.heading("Market questions, answered with data");
                ui.weak("Ask about any prediction-market topic and preview an insight.");
                ui.add_space(12.0);
                self.show_status_banner(ui);

                ui.add(
                    egui::TextEdit::multiline(&mut self.landing_question)
                        .id_salt("landing_question")
                        .hint_text("Will AI chip demand keep rising through 2026?")
                        .desired_rows(3)
                        .desired_width(f32::INFINITY),
                );
                ui.add_space(6.0);

                let can_preview =
                    !self.landing_question.trim().is_empty() && !self.preview_loading;
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(can_preview, egui::Button::new("Preview an insight"))
                        .clicked()
                    {
                        self.preview_loading = true;
                        self.preview_text = None;
                        self.preview_error = None;
                        dispatch_backend_command(
                            &self.cmd_tx,
                            BackendCommand::PreviewQuestion {
                                question: self.landing_question.clone(),
                            },
                            &mut self.status,
                        );
                    }
                    if self.preview_loading {
                        ui.spinner();
                        ui.weak("Generating preview...");
                    }
                });

                if let Some(preview) = self.preview_text.clone() {
                    ui.add_space(10.0);
                    egui::Frame::group(ui.style()).show(ui, |ui| {
                        ui.label(preview);
                        ui.add_space(4.0);
                        ui.weak("Sign in to run the full analysis.");
                    });
                }
                if let Some(reason) = self.preview_error.clone() {
                    ui.add_space(10.0);
                    ui.colored_label(egui::Color32::LIGHT_RED, reason);
                }

                ui.add_space(16.0);
                if ui.button("Sign in to get started").clicked() {
                    self.route = Route::SignIn;
                }
            });
        });
    }

    fn show_sign_in(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(32.0);
            ui.vertical_centered(|ui| {
                ui.set_max_width(460.0);
                ui.heading("Sign in");
                ui.weak("Continue with an identity provider, then paste the callback code.");
                ui.add_space(10.0);
                self.show_status_banner(ui);

                let mut open_provider: Option<&'static str> = None;
                match &self.auth_links {
                    Some(_) => {
                        if ui.button("Continue with Google").clicked() {
                            open_provider = Some("google");
                        }
                        if ui.button("Continue with GitHub").clicked() {
                            open_provider = Some("github");
                        }
                    }
                    None => {
                        ui.colored_label(
                            egui::Color32::LIGHT_RED,
                            "Auth endpoint configuration is invalid; check polyinsights.toml.",
                        );
                    }
                }
                if let Some(provider) = open_provider {
                    if let Some(auth) = &self.auth_links {
                        let url = auth.authorize_url(provider, SIGN_IN_REDIRECT);
                        open_in_browser(url.as_str(), &mut self.status);
                    }
                }

                ui.add_space(12.0);
                ui.separator();
                ui.add_space(8.0);

                ui.label(egui::RichText::new("Callback code").strong());
                ui.add(
                    egui::TextEdit::singleline(&mut self.sign_in_code)
                        .id_salt("sign_in_code")
                        .hint_text("Paste the code from the browser redirect")
                        .desired_width(f32::INFINITY),
                );
                ui.add_space(6.0);

                let can_submit = !self.sign_in_code.trim().is_empty() && !self.sign_in_busy;
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(can_submit, egui::Button::new("Complete sign-in"))
                        .clicked()
                    {
                        self.sign_in_busy = true;
                        dispatch_backend_command(
                            &self.cmd_tx,
                            BackendCommand::ExchangeSignInCode {
                                code: self.sign_in_code.trim().to_string(),
                            },
                            &mut self.status,
                        );
                    }
                    if self.sign_in_busy {
                        ui.spinner();
                    }
                });
            });
        });
    }

    fn show_dashboard(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.add_space(8.0);
                ui.heading(format!("Welcome back, {}", self.user_email));
                self.show_status_banner(ui);
                ui.add_space(8.0);

                self.show_workbench_panel(ui, ctx);

                ui.add_space(16.0);
                ui.separator();
                ui.label(egui::RichText::new("Recent reports").strong());
                self.show_report_list(ui, true);
            });
        });
    }

    fn show_history(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.add_space(8.0);
                ui.heading("Report history");
                self.show_status_banner(ui);
                ui.add_space(8.0);
                self.show_report_list(ui, false);
            });
        });
    }

    fn show_report_list(&mut self, ui: &mut egui::Ui, dashboard: bool) {
        let (loading, entries) = if dashboard {
            (self.dashboard_loading, &self.dashboard_reports)
        } else {
            (self.history_loading, &self.history_reports)
        };

        if loading {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.weak("Loading reports...");
            });
            return;
        }
        if entries.is_empty() {
            ui.weak("No completed reports yet. Run an analysis to create one.");
            return;
        }

        let mut open_report: Option<ReportId> = None;
        for entry in entries {
            let title = format!(
                "{}  -  {}  -  {}",
                entry.question,
                entry.report.status.label(),
                format_report_timestamp(&entry.report.created_at),
            );
            if ui.link(title).clicked() {
                open_report = Some(entry.report.id);
            }
            if !dashboard {
                if let Some(preview) = content_preview_line(entry.report.report_content.as_deref())
                {
                    ui.weak(preview);
                }
                ui.add_space(4.0);
            }
        }
        if let Some(report_id) = open_report {
            self.open_report_detail(report_id);
        }
    }

    fn show_report_detail(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.add_space(8.0);
                if ui.button("< Back to history").clicked() {
                    self.navigate_history();
                }
                ui.add_space(8.0);

                if self.report_detail_loading {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.weak("Loading report...");
                    });
                    return;
                }
                if self.report_detail_missing {
                    ui.heading("Report not found");
                    ui.weak("This report does not exist or belongs to another account.");
                    return;
                }
                let Some((report, question)) = self.report_detail.clone() else {
                    return;
                };

                ui.heading(question);
                ui.weak(format!(
                    "{} - {}",
                    report.status.label(),
                    format_report_timestamp(&report.created_at)
                ));
                ui.add_space(10.0);

                match report.report_content.as_deref() {
                    Some(content) if !content.is_empty() => {
                        render_report_blocks(ui, content, self.text_scale);
                    }
                    _ => {
                        ui.weak("This report has no stored content.");
                    }
                }
            });
        });
    }

    // ---------------- workbench ----------------

    fn show_workbench_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.label(egui::RichText::new("Query workbench").strong());
            ui.add_space(4.0);

            match self.workbench.state {
                ViewState::Idle => self.show_workbench_idle(ui),
                ViewState::LoadingSummary => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Analyzing markets...");
                    });
                }
                ViewState::Review => self.show_workbench_review(ui),
                ViewState::LoadingReport => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Generating full report...");
                    });
                }
                ViewState::Final => self.show_workbench_final(ui, ctx),
                ViewState::Error => self.show_workbench_error(ui),
            }
        });
    }

    fn show_workbench_idle(&mut self, ui: &mut egui::Ui) {
        ui.add(
            egui::TextEdit::multiline(&mut self.workbench_question)
                .id_salt("workbench_question")
                .hint_text("Ask a market question...")
                .desired_rows(3)
                .desired_width(f32::INFINITY),
        );
        ui.add_space(6.0);
        let can_submit = !self.workbench_question.trim().is_empty();
        if ui
            .add_enabled(can_submit, egui::Button::new("Analyze Market Question"))
            .clicked()
        {
            dispatch_backend_command(
                &self.cmd_tx,
                BackendCommand::SubmitQuestion {
                    question: self.workbench_question.clone(),
                },
                &mut self.status,
            );
        }
    }

    fn show_workbench_review(&mut self, ui: &mut egui::Ui) {
        ui.weak(self.workbench.session.question.clone());
        ui.add_space(6.0);
        ui.label(self.workbench.session.summary.clone());
        ui.add_space(8.0);

        let meta = self.workbench.session.meta.clone();
        ui.horizontal(|ui| {
            meta_chip(ui, "Sophistication", &meta.label);
            meta_chip(ui, "Score", &format!("{:.2}", meta.score));
            meta_chip(ui, "Markets", &meta.market_count.to_string());
        });
        ui.add_space(8.0);

        ui.horizontal(|ui| {
            if ui.button("Generate Full Report").clicked() {
                dispatch_backend_command(
                    &self.cmd_tx,
                    BackendCommand::GenerateReport,
                    &mut self.status,
                );
            }
            // Back to the form with the question kept for editing.
            if ui.button("Refine Query").clicked() {
                self.reset_workbench(true);
            }
        });
    }

    fn show_workbench_final(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.weak(self.workbench.session.question.clone());
        ui.add_space(6.0);

        let report = self.workbench.session.report.clone();
        let text_scale = self.text_scale;
        let inner = egui::Frame::NONE
            .fill(ui.visuals().extreme_bg_color)
            .corner_radius(6.0)
            .inner_margin(egui::Margin::symmetric(12, 10))
            .show(ui, |ui| {
                render_report_blocks(ui, &report, text_scale);
            });
        // Captured rect for the PDF raster crop.
        self.report_rect = Some(inner.response.rect);

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            let export_label = if self.exporting {
                "Preparing PDF..."
            } else {
                "Download PDF"
            };
            if ui
                .add_enabled(!self.exporting, egui::Button::new(export_label))
                .clicked()
            {
                self.exporting = true;
                self.exporting_frames = 0;
                ctx.send_viewport_cmd(egui::ViewportCommand::Screenshot(
                    egui::UserData::default(),
                ));
            }
            if ui.button("New Query").clicked() {
                self.reset_workbench(false);
            }
        });
    }

    fn show_workbench_error(&mut self, ui: &mut egui::Ui) {
        ui.colored_label(
            egui::Color32::LIGHT_RED,
            self.workbench.error_message.clone(),
        );
        ui.add_space(6.0);
        if ui.button("Try Again").clicked() {
            self.reset_workbench(true);
        }
    }

    fn reset_workbench(&mut self, keep_question: bool) {
        self.exporting = false;
        if !keep_question {
            self.workbench_question.clear();
        }
        dispatch_backend_command(
            &self.cmd_tx,
            BackendCommand::ResetWorkbench,
            &mut self.status,
        );
    }

    // ---------------- PDF export ----------------

    /// The viewport may never deliver the requested capture (headless or
    /// misbehaving backends); release the export flag after a bounded wait so
    /// the button does not stay disabled for the rest of the session.
    fn tick_export_watchdog(&mut self) {
        if !self.exporting {
            self.exporting_frames = 0;
            return;
        }
        self.exporting_frames += 1;
        if self.exporting_frames > EXPORT_CAPTURE_FRAME_BUDGET {
            self.exporting = false;
            self.exporting_frames = 0;
            self.status = "PDF export failed: no screen capture arrived".to_string();
        }
    }

    fn handle_screenshot_events(&mut self, ctx: &egui::Context) {
        let shot: Option<Arc<egui::ColorImage>> = ctx.input(|input| {
            input
                .events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Screenshot { image, .. } => Some(image.clone()),
                    _ => None,
                })
                .last()
        });
        let Some(shot) = shot else {
            return;
        };
        if !self.exporting {
            return;
        }
        self.exporting = false;

        let pixels_per_point = ctx.pixels_per_point();
        let full = egui::Rect::from_min_size(
            egui::Pos2::ZERO,
            egui::vec2(
                shot.size[0] as f32 / pixels_per_point,
                shot.size[1] as f32 / pixels_per_point,
            ),
        );
        let rect = self.report_rect.unwrap_or(full);
        let (width, height, rgba) = crop_screenshot(&shot, rect, pixels_per_point);

        let Some(image) = rgba_to_rgb(width, height, &rgba) else {
            self.status = "PDF export failed: could not read the report capture".to_string();
            return;
        };
        let pdf = render_report_pdf(&image);
        let filename = report_pdf_filename(&self.workbench.session.session_id);

        let mut dialog = rfd::FileDialog::new().set_file_name(&filename);
        if let Some(downloads) = dirs::download_dir() {
            dialog = dialog.set_directory(downloads);
        }
        match dialog.save_file() {
            Some(path) => match fs::write(&path, &pdf) {
                Ok(()) => {
                    self.status = format!("Saved report to {}", path.display());
                }
                Err(err) => {
                    self.status = format!("Failed to save PDF: {err}");
                }
            },
            None => {
                self.status = "PDF export cancelled".to_string();
            }
        }
    }
}

impl eframe::App for PolyInsightsApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.tick = self.tick.wrapping_add(1);

        self.process_ui_events();
        self.apply_text_scale_if_needed(ctx);
        self.handle_screenshot_events(ctx);
        self.tick_export_watchdog();

        self.show_top_bar(ctx);
        match resolve_route(self.signed_in, self.route) {
            Route::Landing => self.show_landing(ctx),
            Route::SignIn => self.show_sign_in(ctx),
            Route::Dashboard => self.show_dashboard(ctx),
            Route::History => self.show_history(ctx),
            Route::ReportDetail => self.show_report_detail(ctx),
        }

        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let settings = PersistedAppSettings {
            text_scale: self.text_scale,
            access_token: self.access_token.clone(),
        };
        if let Ok(serialized) = serde_json::to_string(&settings) {
            storage.set_string(SETTINGS_STORAGE_KEY, serialized);
        }
    }
}

fn meta_chip(ui: &mut egui::Ui, label: &str, value: &str) {
    egui::Frame::NONE
        .fill(ui.visuals().faint_bg_color)
        .corner_radius(6.0)
        .inner_margin(egui::Margin::symmetric(8, 4))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.small(label);
                ui.strong(value);
            });
        });
}

fn render_report_blocks(ui: &mut egui::Ui, report: &str, text_scale: f32) {
    for block in parse_report(report) {
        match block {
            ReportBlock::Heading1(text) => {
                ui.label(egui::RichText::new(text).strong().size(22.0 * text_scale));
            }
            ReportBlock::Heading2(text) => {
                ui.label(egui::RichText::new(text).strong().size(18.0 * text_scale));
            }
            ReportBlock::Heading3(text) => {
                ui.label(egui::RichText::new(text).strong().size(15.0 * text_scale));
            }
            ReportBlock::Spacer => {
                ui.add_space(8.0);
            }
            ReportBlock::Paragraph(text) => {
                ui.label(text);
            }
        }
    }
}

/// First non-blank, non-heading line of the stored report, shortened for the
/// history listing.
fn content_preview_line(content: Option<&str>) -> Option<String> {
    const PREVIEW_LINE_CHARS: usize = 140;

    let line = content?
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))?;
    match line.char_indices().nth(PREVIEW_LINE_CHARS) {
        Some((idx, _)) => Some(format!("{}...", &line[..idx])),
        None => Some(line.to_string()),
    }
}

fn format_report_timestamp(created_at: &DateTime<Utc>) -> String {
    created_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Crops a screenshot to the given ui rect (in points), returning RGBA bytes
/// at native pixel resolution. The rect is clamped to the capture bounds.
fn crop_screenshot(
    image: &egui::ColorImage,
    rect: egui::Rect,
    pixels_per_point: f32,
) -> (u32, u32, Vec<u8>) {
    let (capture_w, capture_h) = (image.size[0], image.size[1]);
    let min_x = ((rect.min.x * pixels_per_point).max(0.0) as usize).min(capture_w);
    let min_y = ((rect.min.y * pixels_per_point).max(0.0) as usize).min(capture_h);
    let max_x = ((rect.max.x * pixels_per_point).max(0.0) as usize).min(capture_w);
    let max_y = ((rect.max.y * pixels_per_point).max(0.0) as usize).min(capture_h);

    let width = max_x.saturating_sub(min_x);
    let height = max_y.saturating_sub(min_y);

    let mut rgba = Vec::with_capacity(width * height * 4);
    for y in min_y..max_y {
        for x in min_x..max_x {
            let pixel = image.pixels[y * capture_w + x];
            rgba.extend_from_slice(&pixel.to_array());
        }
    }
    (width as u32, height as u32, rgba)
}

fn open_in_browser(url: &str, status: &mut String) {
    #[cfg(target_os = "windows")]
    let result = std::process::Command::new("cmd")
        .args(["/C", "start", "", url])
        .spawn();

    #[cfg(target_os = "macos")]
    let result = std::process::Command::new("open").arg(url).spawn();

    #[cfg(all(unix, not(target_os = "macos")))]
    let result = std::process::Command::new("xdg-open").arg(url).spawn();

    if let Err(err) = result {
        *status = format!("Failed to open browser: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn crop_respects_pixel_scale_and_bounds() {
        // 4x4 capture at 2x scale; rect covers the bottom-right 1x1 point.
        let mut image = egui::ColorImage::filled([4, 4], egui::Color32::BLACK);
        for y in 2..4 {
            for x in 2..4 {
                image.pixels[y * 4 + x] = egui::Color32::WHITE;
            }
        }
        let rect = egui::Rect::from_min_max(egui::pos2(1.0, 1.0), egui::pos2(2.0, 2.0));
        let (width, height, rgba) = crop_screenshot(&image, rect, 2.0);

        assert_eq!((width, height), (2, 2));
        assert_eq!(rgba.len(), 16);
        assert!(rgba.chunks_exact(4).all(|px| px[0] == 255));
    }

    #[test]
    fn crop_clamps_rects_past_the_capture_edge() {
        let image = egui::ColorImage::filled([2, 2], egui::Color32::BLACK);
        let rect = egui::Rect::from_min_max(egui::pos2(-5.0, -5.0), egui::pos2(50.0, 50.0));
        let (width, height, rgba) = crop_screenshot(&image, rect, 1.0);

        assert_eq!((width, height), (2, 2));
        assert_eq!(rgba.len(), 16);
    }

    #[test]
    fn timestamps_render_to_minute_precision() {
        let created_at = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
            .single()
            .expect("timestamp");
        let formatted = format_report_timestamp(&created_at);
        assert_eq!(formatted.len(), "2024-03-01 12:30".len());
    }

    fn test_app() -> PolyInsightsApp {
        let (cmd_tx, _cmd_rx) = crossbeam_channel::bounded(4);
        let (_ui_tx, ui_rx) = crossbeam_channel::bounded(4);
        PolyInsightsApp::new(cmd_tx, ui_rx, None)
    }

    #[test]
    fn export_watchdog_releases_a_capture_that_never_arrives() {
        let mut app = test_app();
        app.exporting = true;

        for _ in 0..EXPORT_CAPTURE_FRAME_BUDGET {
            app.tick_export_watchdog();
        }
        assert!(app.exporting, "still waiting within the frame budget");

        app.tick_export_watchdog();
        assert!(!app.exporting);
        assert!(app.status.contains("no screen capture"));
    }

    #[test]
    fn export_watchdog_counter_resets_once_the_capture_lands() {
        let mut app = test_app();
        app.exporting = true;
        app.tick_export_watchdog();
        assert_eq!(app.exporting_frames, 1);

        // Completed export (flag cleared by the screenshot handler).
        app.exporting = false;
        app.tick_export_watchdog();
        assert_eq!(app.exporting_frames, 0);
    }

    #[test]
    fn content_preview_skips_headings_and_blank_lines() {
        let content = "# Outlook\n\n  \nDemand stays firm through Q3.\nMore detail.";
        assert_eq!(
            content_preview_line(Some(content)).as_deref(),
            Some("Demand stays firm through Q3.")
        );
        assert_eq!(content_preview_line(Some("# Only a heading")), None);
        assert_eq!(content_preview_line(None), None);

        let long = format!("## h\n{}", "x".repeat(200));
        let preview = content_preview_line(Some(&long)).expect("preview");
        assert_eq!(preview.chars().count(), 143);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn persisted_settings_default_to_unit_scale() {
        let settings: PersistedAppSettings = serde_json::from_str("{}").expect("parse");
        assert_eq!(settings, PersistedAppSettings::default());
    }
}
