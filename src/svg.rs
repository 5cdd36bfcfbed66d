use clap::ValueEnum;
use serde::Deserialize;

use crate::stats::AnalysisResult;

const WIDTH: f32 = 1000.0;
const HEIGHT: f32 = 400.0;
const MARGIN_LEFT: f32 = 60.0;
const MARGIN_RIGHT: f32 = 20.0;
const MARGIN_TOP: f32 = 45.0;
const MARGIN_BOTTOM: f32 = 70.0;
const BAR_FILL: f32 = 0.6;
const FONT: &str = "ui-monospace, SFMono-Regular, Menlo, monospace";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    #[default]
    Light,
}

pub struct ThemeColors {
    pub bg: &'static str,
    pub text: &'static str,
    pub axis: &'static str,
    pub languages: &'static str,
    pub topics: &'static str,
    pub activity: &'static str,
}

impl Theme {
    pub fn colors(self) -> ThemeColors {
        match self {
            Theme::Dark => ThemeColors {
                bg: "#161b22",
                text: "#c9d1d9",
                axis: "#616e7f",
                languages: "#79c0ff",
                topics: "#7ee787",
                activity: "#d2a8ff",
            },
            Theme::Light => ThemeColors {
                bg: "#ffffff",
                text: "#24292f",
                axis: "#6a737d",
                languages: "#87ceeb",
                topics: "#90ee90",
                activity: "#800080",
            },
        }
    }
}

// Utilities for building SVG content

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn open_svg(colors: &ThemeColors) -> String {
    let mut out = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\" \
         viewBox=\"0 0 {WIDTH} {HEIGHT}\" font-family=\"{FONT}\" font-size=\"13\">\n"
    );
    out.push_str(&format!(
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>\n",
        colors.bg
    ));
    out
}

struct Panel<'a> {
    x: f32,
    width: f32,
    title: &'a str,
    y_label: &'a str,
    x_label: Option<&'a str>,
    fill: &'a str,
}

fn text(x: f32, y: f32, anchor: &str, fill: &str, size: u32, body: &str) -> String {
    format!(
        "<text x=\"{x:.1}\" y=\"{y:.1}\" text-anchor=\"{anchor}\" fill=\"{fill}\" \
         font-size=\"{size}\">{}</text>\n",
        escape_xml(body)
    )
}

/// Draws one titled bar chart into the horizontal slice described by `panel`.
fn bar_panel(out: &mut String, panel: &Panel, bars: &[(String, u64)], colors: &ThemeColors) {
    let plot_x = panel.x + MARGIN_LEFT;
    let plot_w = panel.width - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_top = MARGIN_TOP;
    let plot_bottom = HEIGHT - MARGIN_BOTTOM;
    let plot_h = plot_bottom - plot_top;

    out.push_str(&text(
        panel.x + panel.width / 2.0,
        plot_top - 18.0,
        "middle",
        colors.text,
        16,
        panel.title,
    ));

    // Axes
    out.push_str(&format!(
        "<path d=\"M{plot_x:.1} {plot_top:.1} V{plot_bottom:.1} H{:.1}\" stroke=\"{}\" fill=\"none\"/>\n",
        plot_x + plot_w,
        colors.axis
    ));

    let label_y = plot_top + plot_h / 2.0;
    let label_x = panel.x + 18.0;
    out.push_str(&format!(
        "<text x=\"{label_x:.1}\" y=\"{label_y:.1}\" text-anchor=\"middle\" fill=\"{}\" \
         transform=\"rotate(-90 {label_x:.1} {label_y:.1})\">{}</text>\n",
        colors.text,
        escape_xml(panel.y_label)
    ));
    if let Some(x_label) = panel.x_label {
        out.push_str(&text(
            plot_x + plot_w / 2.0,
            HEIGHT - 12.0,
            "middle",
            colors.text,
            13,
            x_label,
        ));
    }

    if bars.is_empty() {
        out.push_str(&text(
            plot_x + plot_w / 2.0,
            label_y,
            "middle",
            colors.axis,
            13,
            "No data",
        ));
        return;
    }

    let max = bars.iter().map(|(_, n)| *n).max().unwrap_or(1).max(1) as f32;
    let slot = plot_w / bars.len() as f32;
    let bar_w = slot * BAR_FILL;

    for (i, (label, count)) in bars.iter().enumerate() {
        let h = (*count as f32 / max) * plot_h;
        let x = plot_x + slot * i as f32 + (slot - bar_w) / 2.0;
        let y = plot_bottom - h;
        let center = x + bar_w / 2.0;

        out.push_str(&format!(
            "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{bar_w:.1}\" height=\"{h:.1}\" fill=\"{}\"/>\n",
            panel.fill
        ));
        out.push_str(&text(center, y - 5.0, "middle", colors.text, 12, &count.to_string()));
        out.push_str(&text(center, plot_bottom + 18.0, "middle", colors.text, 12, label));
    }
}

/// Languages and topics side by side. Topics are left out when empty.
pub fn overview_svg(result: &AnalysisResult, theme: Theme) -> String {
    let colors = theme.colors();
    let mut out = open_svg(&colors);

    let panels = if result.topic_counts.is_empty() { 1 } else { 2 };
    let width = WIDTH / panels as f32;

    bar_panel(
        &mut out,
        &Panel {
            x: 0.0,
            width,
            title: "Top Languages",
            y_label: "Count",
            x_label: None,
            fill: colors.languages,
        },
        &result.language_counts,
        &colors,
    );

    if !result.topic_counts.is_empty() {
        bar_panel(
            &mut out,
            &Panel {
                x: width,
                width,
                title: "Top Topics",
                y_label: "Count",
                x_label: None,
                fill: colors.topics,
            },
            &result.topic_counts,
            &colors,
        );
    }

    out.push_str("</svg>\n");
    out
}

/// Repositories created per month of the analysis year.
pub fn activity_svg(result: &AnalysisResult, theme: Theme) -> String {
    let colors = theme.colors();
    let mut out = open_svg(&colors);
    let year = result.analysis_year;

    if result.monthly_activity.is_empty() {
        out.push_str(&text(
            WIDTH / 2.0,
            HEIGHT / 2.0,
            "middle",
            colors.text,
            16,
            &format!("No new repositories in {year}"),
        ));
    } else {
        let bars: Vec<(String, u64)> = result
            .monthly_activity
            .iter()
            .map(|(month, n)| (month.to_string(), *n))
            .collect();
        bar_panel(
            &mut out,
            &Panel {
                x: 0.0,
                width: WIDTH,
                title: &format!("New Repositories in {year}"),
                y_label: "Number of new repositories",
                x_label: Some("Month"),
                fill: colors.activity,
            },
            &bars,
            &colors,
        );
    }

    out.push_str("</svg>\n");
    out
}
