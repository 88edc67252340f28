/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! Per-Message/Folder/Manager event log (spec.md §7), kept alongside the
//! ambient `tracing` facade rather than built on top of it: callers that
//! never install a `tracing` subscriber can still enumerate what happened
//! via `errors()`/`warnings()`/`report()`.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Progress,
    Notice,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

/// Bounded ring buffer of events. Oldest events are dropped once `capacity`
/// is exceeded so a long-lived Folder/Manager can't grow its log forever.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<LogEvent>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        EventLog::new(1000)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        EventLog {
            events: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(LogEvent {
            level,
            message: message.into(),
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message);
    }

    pub fn progress(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Progress, message);
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Notice, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn errors(&self) -> impl Iterator<Item = &LogEvent> {
        self.report(LogLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LogEvent> {
        self.report(LogLevel::Warning)
    }

    /// All events at or above `level`.
    pub fn report(&self, level: LogLevel) -> impl Iterator<Item = &LogEvent> {
        self.events.iter().filter(move |e| e.level >= level)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
