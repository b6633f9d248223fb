/**
 * FILE DE COMMANDES - FIFO mono-consommateur d'un device
 *
 * RÔLE : Tampon entre l'opérateur (enqueue) et le device (poll).
 * Livraison au plus une fois : une commande sort de la file au premier poll.
 * Pas de priorité, pas de dédoublonnage, pas de persistance.
 */

use crate::models::{Command, QueuedCommand};
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Mutex<VecDeque<QueuedCommand>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute une commande en queue de file.
    pub fn enqueue(&self, command: Command) -> QueuedCommand {
        let queued = QueuedCommand::new(command);
        self.pending.lock().push_back(queued.clone());
        queued
    }

    /// Non bloquant : `None` si la file est vide.
    pub fn dequeue_next(&self) -> Option<QueuedCommand> {
        self.pending.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}
