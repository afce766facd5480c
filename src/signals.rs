//! Notification hub: decouples peripheral interrupt sources and UI events
//! from their consumers.
//!
//! Components publish a [`Notify`] value; every channel subscribed to that
//! id receives it. Sending never blocks (channels are unbounded) and
//! happens on the publishing thread; consumers drain their receiver when
//! convenient — the scheduler does so between instructions.

use std::collections::HashMap;
use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notify {
    /// A peripheral pulled the IRQ line.
    SetIrq,
    /// A peripheral pulled the FIRQ line.
    SetFirq,
    /// A peripheral pulled the NMI line.
    SetNmi,
    /// PIA2 activated the bell.
    Bell,
    /// The guest read the keyboard register for the first time.
    FirstKeyboardRequest,
    /// A drive was mounted, unmounted or its status changed.
    DiskStatusChanged,
}

pub struct SignalHub {
    subscribers: Mutex<HashMap<Notify, Vec<Sender<Notify>>>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(HashMap::new()) }
    }

    /// Subscribe to one notification id. Meant to be called once per
    /// consumer at construction time.
    pub fn subscribe(&self, id: Notify) -> Receiver<Notify> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().entry(id).or_default().push(tx);
        rx
    }

    /// Publish `id` to all subscribers. Dead receivers are dropped.
    pub fn notify(&self, id: Notify) {
        let mut map = self.subscribers.lock().unwrap();
        if let Some(list) = map.get_mut(&id) {
            list.retain(|tx| tx.send(id).is_ok());
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_reaches_every_subscriber() {
        let hub = SignalHub::new();
        let rx1 = hub.subscribe(Notify::SetIrq);
        let rx2 = hub.subscribe(Notify::SetIrq);
        hub.notify(Notify::SetIrq);
        assert_eq!(rx1.try_recv(), Ok(Notify::SetIrq));
        assert_eq!(rx2.try_recv(), Ok(Notify::SetIrq));
    }

    #[test]
    fn ids_are_independent() {
        let hub = SignalHub::new();
        let irq = hub.subscribe(Notify::SetIrq);
        let bell = hub.subscribe(Notify::Bell);
        hub.notify(Notify::Bell);
        assert!(irq.try_recv().is_err());
        assert_eq!(bell.try_recv(), Ok(Notify::Bell));
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let hub = SignalHub::new();
        drop(hub.subscribe(Notify::SetNmi));
        hub.notify(Notify::SetNmi);
        hub.notify(Notify::SetNmi);
    }
}
