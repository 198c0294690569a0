//! Chart builders for the dashboard.
//!
//! Interactive charts are `plotly` figures serialized to the JSON shape plotly.js expects
//! (`{data, layout}`); the forecast components are a static `plotters` SVG.

mod components;

pub use components::components_svg;

use crate::forecast::ForecastRow;
use crate::ingest::types::PriceBar;
use anyhow::{Context, Result};
use plotly::common::{Fill, Line, Marker, Mode, Title};
use plotly::layout::{Axis, RangeSlider};
use plotly::{Layout, Scatter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RAW_CHART_TITLE: &str = "Time Series data with Rangeslider";

/// A plotly figure ready for `Plotly.newPlot(div, figure.data, figure.layout)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub data: Vec<Value>,
    pub layout: Value,
}

impl Figure {
    fn build<T: Serialize>(traces: &[T], layout: &Layout) -> Result<Self> {
        let data = traces
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to serialize chart traces")?;
        let layout = serde_json::to_value(layout).context("failed to serialize chart layout")?;
        Ok(Self { data, layout })
    }
}

fn date_labels<'a>(dates: impl Iterator<Item = &'a chrono::NaiveDate>) -> Vec<String> {
    dates.map(|d| d.format("%Y-%m-%d").to_string()).collect()
}

fn with_range_slider(layout: Layout) -> Layout {
    layout.x_axis(Axis::new().range_slider(RangeSlider::new().visible(true)))
}

/// Open and close prices against date.
pub fn raw_price_figure(bars: &[PriceBar]) -> Result<Figure> {
    let dates = date_labels(bars.iter().map(|b| &b.date));
    let open = Scatter::new(dates.clone(), bars.iter().map(|b| b.open).collect())
        .mode(Mode::Lines)
        .name("stock_open");
    let close = Scatter::new(dates, bars.iter().map(|b| b.close).collect())
        .mode(Mode::Lines)
        .name("stock_close");

    let layout = with_range_slider(Layout::new().title(Title::with_text(RAW_CHART_TITLE)));
    Figure::build(&[open, close], &layout)
}

/// Observed closes, the predicted line and its uncertainty band.
pub fn forecast_figure(history: &[PriceBar], forecast: &[ForecastRow]) -> Result<Figure> {
    let band_color = "rgba(0, 114, 178, 0.2)";
    let line_color = "rgb(0, 114, 178)";
    let forecast_dates = date_labels(forecast.iter().map(|r| &r.ds));

    let actual = Scatter::new(
        date_labels(history.iter().map(|b| &b.date)),
        history.iter().map(|b| b.close).collect(),
    )
    .mode(Mode::Markers)
    .name("Actual")
    .marker(Marker::new().color("black"));

    let lower = Scatter::new(
        forecast_dates.clone(),
        forecast.iter().map(|r| r.yhat_lower).collect(),
    )
    .mode(Mode::Lines)
    .name("Lower Bound")
    .line(Line::new().width(0.0))
    .show_legend(false);

    let predicted = Scatter::new(forecast_dates.clone(), forecast.iter().map(|r| r.yhat).collect())
        .mode(Mode::Lines)
        .name("Predicted")
        .line(Line::new().color(line_color).width(2.0))
        .fill(Fill::ToNextY)
        .fill_color(band_color);

    let upper = Scatter::new(forecast_dates, forecast.iter().map(|r| r.yhat_upper).collect())
        .mode(Mode::Lines)
        .name("Upper Bound")
        .line(Line::new().width(0.0))
        .fill(Fill::ToNextY)
        .fill_color(band_color)
        .show_legend(false);

    let layout = with_range_slider(
        Layout::new()
            .y_axis(Axis::new().title(Title::with_text("y")))
            .height(600),
    );
    Figure::build(&[actual, lower, predicted, upper], &layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars(n: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        (0..n)
            .map(|i| PriceBar::flat(start + Duration::days(i as i64), 10.0 + i as f64))
            .collect()
    }

    #[test]
    fn raw_figure_has_open_and_close_with_slider() {
        let fig = raw_price_figure(&bars(3)).unwrap();
        let names: Vec<&str> = fig.data.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, vec!["stock_open", "stock_close"]);
        assert_eq!(fig.data[1]["x"][2], "2024-01-04");
        assert_eq!(fig.data[1]["y"][2], 12.0);
        assert_eq!(fig.layout["title"]["text"], RAW_CHART_TITLE);
        assert_eq!(fig.layout["xaxis"]["rangeslider"]["visible"], true);
    }

    #[test]
    fn forecast_figure_fills_band_between_bounds() {
        let history = bars(2);
        let forecast: Vec<ForecastRow> = history
            .iter()
            .map(|b| ForecastRow {
                ds: b.date,
                trend: b.close,
                trend_lower: b.close,
                trend_upper: b.close,
                weekly: None,
                yearly: None,
                yhat: b.close,
                yhat_lower: b.close - 1.0,
                yhat_upper: b.close + 1.0,
            })
            .collect();

        let fig = forecast_figure(&history, &forecast).unwrap();
        assert_eq!(fig.data.len(), 4);
        assert_eq!(fig.data[0]["mode"], "markers");
        assert_eq!(fig.data[1]["y"][0], 9.0);
        assert_eq!(fig.data[3]["fill"], "tonexty");
        assert_eq!(fig.layout["xaxis"]["rangeslider"]["visible"], true);
    }
}
