//! Security event log and analytics for the request guard.
//!
//! Every verdict becomes a `SecurityEvent` appended to a bounded in-memory
//! ring buffer. The buffer backs the admin log viewer and the summary
//! statistics it shows.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::models::{EventLogConfig, SecurityEvent};

/// Block count for one client identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientCount {
    pub client_identifier: String,
    pub count: usize,
}

/// Block count for one user-agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAgentCount {
    pub user_agent: String,
    pub count: usize,
}

/// Aggregate view of the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAnalysis {
    pub total_requests: usize,
    pub blocked_requests: usize,
    pub top_blocked_clients: Vec<ClientCount>,
    pub top_blocked_user_agents: Vec<UserAgentCount>,
    /// Most recent high and critical events, newest first
    pub recent_threats: Vec<SecurityEvent>,
}

/// Fixed-capacity ring buffer of security events
#[derive(Debug)]
pub struct SecurityEventLog {
    config: EventLogConfig,
    events: VecDeque<SecurityEvent>,
}

impl SecurityEventLog {
    pub fn new(config: EventLogConfig) -> Self {
        Self {
            events: VecDeque::with_capacity(config.capacity),
            config,
        }
    }

    /// Append an event, evicting the oldest once the buffer is full
    pub fn record(&mut self, event: SecurityEvent) {
        if self.config.capacity == 0 {
            return;
        }
        while self.events.len() >= self.config.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Up to `limit` events, newest first
    pub fn query(&self, limit: usize) -> Vec<SecurityEvent> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    /// Up to `limit` events for one client identifier, newest first
    pub fn query_client(&self, client_identifier: &str, limit: usize) -> Vec<SecurityEvent> {
        self.events
            .iter()
            .rev()
            .filter(|event| event.client_identifier == client_identifier)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Summarise the buffer
    pub fn analyze(&self) -> SecurityAnalysis {
        let mut client_counts: HashMap<&str, usize> = HashMap::new();
        let mut agent_counts: HashMap<&str, usize> = HashMap::new();
        let mut blocked_requests = 0;

        for event in self.events.iter().filter(|event| event.is_blocked()) {
            blocked_requests += 1;
            *client_counts.entry(event.client_identifier.as_str()).or_insert(0) += 1;
            *agent_counts.entry(event.user_agent.as_str()).or_insert(0) += 1;
        }

        let top_n = self.config.top_n;
        let top_blocked_clients = top_counts(client_counts, top_n)
            .into_iter()
            .map(|(client_identifier, count)| ClientCount {
                client_identifier,
                count,
            })
            .collect();
        let top_blocked_user_agents = top_counts(agent_counts, top_n)
            .into_iter()
            .map(|(user_agent, count)| UserAgentCount { user_agent, count })
            .collect();

        let recent_threats = self
            .events
            .iter()
            .rev()
            .filter(|event| event.severity.is_threat())
            .take(self.config.recent_threats)
            .cloned()
            .collect();

        SecurityAnalysis {
            total_requests: self.events.len(),
            blocked_requests,
            top_blocked_clients,
            top_blocked_user_agents,
            recent_threats,
        }
    }
}

/// Highest counts first, ties broken by key so the order is stable
fn top_counts(counts: HashMap<&str, usize>, limit: usize) -> Vec<(String, usize)> {
    let mut sorted: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(key, count)| (key.to_string(), count))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(limit);
    sorted
}
