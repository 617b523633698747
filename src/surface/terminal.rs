use log::{ debug, error, info };
use std::fs;
use std::io::{ self, Write };
use std::path::PathBuf;

use super::{ check_png_signature, ChatSurface, ElementId };
use crate::models::chat::{ ChartImage, ChatMessage, Role };

/// Line-oriented surface. The terminal itself plays the container, message
/// list, input and send control (Enter); `/close` is the close control.
pub struct TerminalSurface<W: Write + Send> {
    out: W,
    chart_dir: Option<PathBuf>,
    charts_written: usize,
    pending_chart: Option<String>,
    closed: bool,
}

impl TerminalSurface<io::Stdout> {
    pub fn stdout(chart_dir: Option<PathBuf>) -> Self {
        Self::new(io::stdout(), chart_dir)
    }
}

impl<W: Write + Send> TerminalSurface<W> {
    pub fn new(out: W, chart_dir: Option<PathBuf>) -> Self {
        Self {
            out,
            chart_dir,
            charts_written: 0,
            pending_chart: None,
            closed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            error!("Failed to write to terminal: {}", e);
        }
    }

    fn store_chart(&mut self, image: &ChartImage) -> Result<String, String> {
        let Some(dir) = self.chart_dir.as_ref() else {
            return Ok(format!("inline chart, {} bytes", image.data_uri().len()));
        };
        fs::create_dir_all(dir).map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;

        let stem = image.label.as_deref().map(sanitize).unwrap_or_else(|| "chart".to_string());
        let path = dir.join(format!("{}-{}.png", stem, self.charts_written + 1));
        fs::write(&path, &image.png).map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
        self.charts_written += 1;
        info!("Chart saved to {}", path.display());
        Ok(path.display().to_string())
    }
}

impl<W: Write + Send> ChatSurface for TerminalSurface<W> {
    fn has_element(&self, _id: ElementId) -> bool {
        true
    }

    fn append_message(&mut self, message: &ChatMessage) {
        let prefix = match message.role {
            Role::User => "you>",
            Role::Bot => "bot>",
        };
        let mut lines = message.text.lines();
        let first = lines.next().unwrap_or("");
        self.write_line(&format!("{} {}", prefix, first));
        for line in lines {
            self.write_line(&format!("     {}", line));
        }
        if message.image.is_some() {
            if let Some(chart) = self.pending_chart.take() {
                self.write_line(&format!("     [chart: {}]", chart));
            }
        }
    }

    fn clear_input(&mut self) {
        debug!("Input line consumed");
    }

    fn set_loading(&mut self, visible: bool) {
        if visible {
            self.write_line("     ...");
        }
    }

    fn prepare_image(&mut self, image: &ChartImage) -> Result<(), String> {
        check_png_signature(&image.png)?;
        let location = self.store_chart(image)?;
        self.pending_chart = Some(location);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.write_line("chat closed");
        }
    }
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "chart".to_string() } else { cleaned }
}
