use super::page::{Block, Page};
use super::pipeline::APP_TITLE;
use crate::chart::Figure;
use std::fmt::Write;

const PLOTLY_JS: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";
const FORM_ID: &str = "controls";

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:2rem auto;padding:0 1rem;color:#262730}\
label{display:block;margin:1rem 0}\
input[type=text]{display:block;width:100%;padding:.4rem;font-size:1rem}\
input[type=range]{display:block;width:100%}\
table{border-collapse:collapse;font-size:.85rem;margin:1rem 0}\
th,td{border:1px solid #ddd;padding:.25rem .5rem;text-align:right}\
.alert{padding:.75rem 1rem;border-radius:.4rem;margin:1rem 0}\
.success{background:#e8f9ee;color:#177233}\
.warning{background:#fffce7;color:#926c05}\
.error{background:#ffecec;color:#7d353b}\
.chart{width:100%;height:500px}\
.components svg{max-width:100%;height:auto}";

/// Minimal HTML escaping for text and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// JSON is embedded in a <script> element, so a literal "</" must not close it early.
fn script_json(value: &impl serde::Serialize) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
}

fn page_title(page: &Page) -> &str {
    page.blocks
        .iter()
        .find_map(|b| match b {
            Block::Title { text } => Some(text.as_str()),
            _ => None,
        })
        .unwrap_or(APP_TITLE)
}

fn write_chart(out: &mut String, index: usize, figure: &Figure) {
    let id = format!("chart-{index}");
    let _ = write!(
        out,
        "<div id=\"{id}\" class=\"chart\"></div>\n<script>Plotly.newPlot(\"{id}\", {}, {});</script>\n",
        script_json(&figure.data),
        script_json(&figure.layout),
    );
}

fn write_table(out: &mut String, columns: &[String], rows: &[Vec<String>]) {
    out.push_str("<table>\n<thead><tr>");
    for column in columns {
        let _ = write!(out, "<th>{}</th>", escape(column));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape(cell));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
}

fn write_block(out: &mut String, block: &Block, charts: &mut usize) {
    match block {
        Block::Title { text } => {
            let _ = writeln!(out, "<h1>{}</h1>", escape(text));
        }
        Block::Subheader { text } => {
            let _ = writeln!(out, "<h3>{}</h3>", escape(text));
        }
        Block::Text { text } => {
            let _ = writeln!(out, "<p>{}</p>", escape(text));
        }
        Block::Field { label, value } => {
            let _ = writeln!(
                out,
                "<p><strong>{}:</strong> {}</p>",
                escape(label),
                escape(value)
            );
        }
        Block::Success { text } => {
            let _ = writeln!(out, "<div class=\"alert success\">{}</div>", escape(text));
        }
        Block::Warning { text } => {
            let _ = writeln!(out, "<div class=\"alert warning\">{}</div>", escape(text));
        }
        Block::Error { text } => {
            let _ = writeln!(out, "<div class=\"alert error\">{}</div>", escape(text));
        }
        Block::TextInput { name, label, value } => {
            let _ = writeln!(
                out,
                "<label>{}<input type=\"text\" name=\"{}\" value=\"{}\" form=\"{FORM_ID}\"></label>",
                escape(label),
                escape(name),
                escape(value)
            );
        }
        Block::Slider {
            name,
            label,
            min,
            max,
            value,
        } => {
            let _ = writeln!(
                out,
                "<label>{} <output>{value}</output><input type=\"range\" name=\"{}\" min=\"{min}\" max=\"{max}\" step=\"1\" value=\"{value}\" form=\"{FORM_ID}\" oninput=\"this.previousElementSibling.value=this.value\" onchange=\"this.form.submit()\"></label>",
                escape(label),
                escape(name)
            );
        }
        Block::Table { columns, rows } => write_table(out, columns, rows),
        Block::Chart { figure } => {
            write_chart(out, *charts, figure);
            *charts += 1;
        }
        Block::Image { alt, svg } => {
            let _ = writeln!(
                out,
                "<figure class=\"components\" role=\"img\" aria-label=\"{}\">{svg}</figure>",
                escape(alt)
            );
        }
    }
}

/// Standalone HTML document for a page. Charts are drawn client side by plotly.js.
pub fn render_html(page: &Page) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<script src=\"{PLOTLY_JS}\"></script>\n<style>{STYLE}</style>\n\
         </head>\n<body>\n<form id=\"{FORM_ID}\" method=\"get\" action=\"/\"></form>\n",
        escape(page_title(page))
    );

    let mut charts = 0;
    for block in &page.blocks {
        write_block(&mut out, block, &mut charts);
    }

    out.push_str("</body>\n</html>\n");
    out
}
