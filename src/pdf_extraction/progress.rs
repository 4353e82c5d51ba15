// Typed progress events for long-running extraction work
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// 0..=100
    pub percent: u8,
    pub stage: String,
}

/// Sending half handed to extraction code. A reporter without a receiver
/// (or whose receiver has gone away) drops events silently; extraction never
/// waits on its consumer.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    offset: f32,
    span: f32,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self {
            tx: None,
            offset: 0.0,
            span: 100.0,
        }
    }
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = Self {
            tx: Some(tx),
            ..Self::default()
        };
        (reporter, rx)
    }

    pub fn silent() -> Self {
        Self::default()
    }

    /// A reporter whose 0..100 maps onto `start..end` of this one, for
    /// running one stage inside a larger job.
    pub fn scaled(&self, start: f32, end: f32) -> Self {
        let start = start.clamp(0.0, 100.0);
        let end = end.clamp(start, 100.0);
        Self {
            tx: self.tx.clone(),
            offset: self.offset + start / 100.0 * self.span,
            span: (end - start) / 100.0 * self.span,
        }
    }

    pub fn report(&self, percent: f32, stage: impl Into<String>) {
        let Some(tx) = &self.tx else { return };
        let local = percent.clamp(0.0, 100.0) / 100.0 * self.span;
        let percent = (self.offset + local).clamp(0.0, 100.0).round() as u8;
        let _ = tx.send(ProgressEvent {
            percent,
            stage: stage.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_clamps_and_delivers() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.report(-5.0, "start");
        reporter.report(140.0, "done");
        assert_eq!(rx.try_recv().unwrap().percent, 0);
        let last = rx.try_recv().unwrap();
        assert_eq!(last.percent, 100);
        assert_eq!(last.stage, "done");
    }

    #[test]
    fn test_scaled_reporter_maps_into_range() {
        let (reporter, mut rx) = ProgressReporter::channel();
        let stage = reporter.scaled(60.0, 80.0);
        stage.report(0.0, "a");
        stage.report(50.0, "b");
        stage.report(100.0, "c");
        let nested = stage.scaled(50.0, 100.0);
        nested.report(50.0, "d");
        let got: Vec<u8> = std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.percent).collect();
        assert_eq!(got, vec![60, 70, 80, 75]);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (reporter, rx) = ProgressReporter::channel();
        drop(rx);
        reporter.report(50.0, "still fine");
        ProgressReporter::silent().report(10.0, "nobody listening");
    }
}
