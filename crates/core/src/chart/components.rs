use crate::forecast::{ForecastRow, Forecaster, Seasonality};
use anyhow::{anyhow, Result};
use chrono::{Datelike, Duration, NaiveDate};
use plotters::prelude::*;
use std::ops::Range;

const PANEL_WIDTH: u32 = 900;
const PANEL_HEIGHT: u32 = 250;
const LINE: RGBColor = RGBColor(0, 114, 178);
const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

struct Panel {
    name: &'static str,
    points: Vec<(f64, f64)>,
    band: Option<Vec<(f64, f64, f64)>>,
    x_label: fn(NaiveDate, f64) -> String,
    origin: NaiveDate,
}

fn padded(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return -1.0..1.0;
    }
    let pad = ((hi - lo) * 0.05).max(1e-6);
    (lo - pad)..(hi + pad)
}

fn day_offset(origin: NaiveDate, ds: NaiveDate) -> f64 {
    (ds - origin).num_days() as f64
}

fn date_label(origin: NaiveDate, x: f64) -> String {
    (origin + Duration::days(x.round() as i64))
        .format("%Y-%m")
        .to_string()
}

fn weekday_label(origin: NaiveDate, x: f64) -> String {
    let day = origin + Duration::days(x.round() as i64);
    WEEKDAYS[day.weekday().num_days_from_sunday() as usize].to_string()
}

fn month_label(origin: NaiveDate, x: f64) -> String {
    (origin + Duration::days(x.round() as i64))
        .format("%B %-d")
        .to_string()
}

fn trend_panel(forecast: &[ForecastRow]) -> Option<Panel> {
    let origin = forecast.first()?.ds;
    Some(Panel {
        name: "trend",
        points: forecast
            .iter()
            .map(|r| (day_offset(origin, r.ds), r.trend))
            .collect(),
        band: Some(
            forecast
                .iter()
                .map(|r| (day_offset(origin, r.ds), r.trend_lower, r.trend_upper))
                .collect(),
        ),
        x_label: date_label,
        origin,
    })
}

fn seasonal_panel(forecaster: &Forecaster, seasonality: Seasonality) -> Result<Option<Panel>> {
    let profile = forecaster.seasonal_profile(seasonality)?;
    let Some((origin, _)) = profile.first().copied() else {
        return Ok(None);
    };
    let x_label = match seasonality {
        Seasonality::Weekly => weekday_label,
        Seasonality::Yearly => month_label,
    };
    Ok(Some(Panel {
        name: seasonality.name(),
        points: profile
            .iter()
            .map(|(ds, v)| (day_offset(origin, *ds), *v))
            .collect(),
        band: None,
        x_label,
        origin,
    }))
}

fn draw_panel<DB>(area: &DrawingArea<DB, plotters::coord::Shift>, panel: &Panel) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let x_range = padded(panel.points.iter().map(|(x, _)| *x));
    let y_values = panel.points.iter().map(|(_, y)| *y).chain(
        panel
            .band
            .iter()
            .flatten()
            .flat_map(|(_, lo, hi)| [*lo, *hi]),
    );
    let y_range = padded(y_values);

    let mut chart = ChartBuilder::on(area)
        .margin(15)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 35)
        .build_cartesian_2d(x_range, y_range)
        .map_err(|e| anyhow!("{} panel: {e}", panel.name))?;

    let origin = panel.origin;
    let x_label = panel.x_label;
    chart
        .configure_mesh()
        .x_desc("ds")
        .y_desc(panel.name)
        .x_labels(8)
        .x_label_formatter(&|x| x_label(origin, *x))
        .y_label_formatter(&|y| format!("{y:.2}"))
        .draw()
        .map_err(|e| anyhow!("{} panel: {e}", panel.name))?;

    if let Some(band) = panel.band.as_ref().filter(|b| !b.is_empty()) {
        let outline: Vec<(f64, f64)> = band
            .iter()
            .map(|(x, _, hi)| (*x, *hi))
            .chain(band.iter().rev().map(|(x, lo, _)| (*x, *lo)))
            .collect();
        chart
            .draw_series(std::iter::once(Polygon::new(outline, LINE.mix(0.2).filled())))
            .map_err(|e| anyhow!("{} band: {e}", panel.name))?;
    }

    chart
        .draw_series(LineSeries::new(panel.points.iter().copied(), LINE.stroke_width(2)))
        .map_err(|e| anyhow!("{} line: {e}", panel.name))?;
    Ok(())
}

/// Trend panel plus one panel per fitted seasonality, stacked vertically, as an SVG document.
pub fn components_svg(forecaster: &Forecaster, forecast: &[ForecastRow]) -> Result<String> {
    let mut panels: Vec<Panel> = trend_panel(forecast).into_iter().collect();
    for seasonality in forecaster.seasonalities() {
        panels.extend(seasonal_panel(forecaster, seasonality)?);
    }
    if panels.is_empty() {
        return Err(anyhow!("no forecast components to plot"));
    }

    let mut svg = String::new();
    {
        let height = PANEL_HEIGHT * panels.len() as u32;
        let root = SVGBackend::with_string(&mut svg, (PANEL_WIDTH, height)).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| anyhow!("components canvas: {e}"))?;
        let areas = root.split_evenly((panels.len(), 1));
        for (area, panel) in areas.iter().zip(&panels) {
            draw_panel(area, panel)?;
        }
        root.present()
            .map_err(|e| anyhow!("components canvas: {e}"))?;
    }
    Ok(svg)
}
