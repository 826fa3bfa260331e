use metrics::counter;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

use ledgerwatch_domain::model::ErrorNotice;
use ledgerwatch_domain::Component;

struct Slot {
    component: Box<dyn Component>,
    started: bool,
}

/// Starts components in registration order and stops them in reverse.
/// Failures are reported as error notices; nothing is restarted.
pub struct Supervisor {
    slots: Vec<Slot>,
    errors: UnboundedSender<ErrorNotice>,
}

impl Supervisor {
    pub fn new(errors: UnboundedSender<ErrorNotice>) -> Self {
        Self {
            slots: Vec::new(),
            errors,
        }
    }

    pub fn with_component(mut self, component: impl Component + 'static) -> Self {
        self.slots.push(Slot {
            component: Box::new(component),
            started: false,
        });
        self
    }

    pub fn running(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|slot| slot.started)
            .map(|slot| slot.component.name())
            .collect()
    }

    pub async fn start(&mut self) {
        for slot in &mut self.slots {
            if slot.started {
                continue;
            }
            let name = slot.component.name();
            match slot.component.start().await {
                Ok(()) => {
                    info!(component = name, "component started");
                    slot.started = true;
                }
                Err(err) => report(&self.errors, ErrorNotice::component(name, err)),
            }
        }
    }

    pub async fn stop(&mut self) {
        for slot in self.slots.iter_mut().rev() {
            if !slot.started {
                continue;
            }
            let name = slot.component.name();
            slot.started = false;
            match slot.component.stop().await {
                Ok(()) => info!(component = name, "component stopped"),
                Err(err) => report(&self.errors, ErrorNotice::component(name, err)),
            }
        }
    }
}

fn report(errors: &UnboundedSender<ErrorNotice>, notice: ErrorNotice) {
    if errors.send(notice).is_err() {
        debug!("error notice receiver closed");
    }
}

/// Logs every notice until all senders are gone. Returns how many were seen.
pub async fn log_notices(mut notices: UnboundedReceiver<ErrorNotice>) -> usize {
    let mut seen = 0;
    while let Some(notice) = notices.recv().await {
        seen += 1;
        counter!("supervisor_error_notices_total", "subject" => notice.subject.as_ref().to_string())
            .increment(1);
        error!(
            subject = %notice.subject,
            identity = %notice.identity,
            cause = %notice.cause,
            "error notice"
        );
    }
    seen
}
