use dragfall_core::model::EvaluationResult;
use dragfall_core::SimulationOutput;
use eframe::egui;
use egui_plot::{HLine, Legend, Line, LineStyle, Plot, PlotPoint};

pub const CHART_TITLE: &str = "Fall with linear drag - velocity vs time";

/// Interactive velocity chart: one curve per scenario plus a dashed line at
/// each scenario's terminal velocity.
pub struct VelocityChart {
    series: Vec<Series>,
}

struct Series {
    name: String,
    points: Vec<PlotPoint>,
    terminal_velocity: f64,
    terminal_name: String,
}

fn curve_name(result: &EvaluationResult) -> String {
    let params = &result.params;
    format!(
        "{} (m = {} kg, gamma = {} kg/s, g = {} m/s^2, v0 = {} m/s)",
        result.label,
        params.mass(),
        params.drag(),
        params.gravity(),
        params.initial_velocity()
    )
}

impl VelocityChart {
    #[must_use]
    pub fn from_output(output: &SimulationOutput) -> Self {
        let times = output.grid.times();
        let series = output
            .results
            .iter()
            .map(|result| Series {
                name: curve_name(result),
                points: times
                    .iter()
                    .zip(&result.velocities)
                    .map(|(&t, &v)| PlotPoint::new(t, v))
                    .collect(),
                terminal_velocity: result.terminal_velocity,
                terminal_name: format!("v_T = {:.2} m/s", result.terminal_velocity),
            })
            .collect();
        Self { series }
    }

    /// Blocks until the window is closed.
    #[allow(clippy::missing_errors_doc)]
    pub fn run(self) -> Result<(), eframe::Error> {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default().with_inner_size([800.0, 500.0]),
            ..Default::default()
        };
        eframe::run_native(CHART_TITLE, options, Box::new(|_cc| Ok(Box::new(self))))
    }
}

impl eframe::App for VelocityChart {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(CHART_TITLE);
            Plot::new("velocity-plot")
                .legend(Legend::default())
                .x_axis_label("t (s)")
                .y_axis_label("v(t) (m/s)")
                .show_grid(true)
                .show(ui, |plot_ui| {
                    for series in &self.series {
                        plot_ui.line(Line::new(series.points.as_slice()).name(&series.name));
                        plot_ui.hline(
                            HLine::new(series.terminal_velocity)
                                .style(LineStyle::dashed_loose())
                                .name(&series.terminal_name),
                        );
                    }
                });
        });
    }
}
