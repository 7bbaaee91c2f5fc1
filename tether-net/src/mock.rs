//! Stateful command-runner mock for tests
//!
//! [`MockRunner`] records every invocation and emulates the
//! `-C`/`-A`/`-D` semantics of `iptables`/`ip6tables` against an
//! in-memory rule list: `-C` succeeds iff the rule is installed, `-A`
//! appends unconditionally (so duplicate installs are visible, exactly
//! like the real tool), `-D` removes one matching rule and fails when
//! none exists. Any other command returns a canned response, or empty
//! success by default.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::cmd::{CmdOutput, CommandRunner};
use crate::error::Result;

#[derive(Default)]
struct MockState {
    rules: Vec<String>,
    canned: HashMap<String, CmdOutput>,
    calls: Vec<String>,
}

/// In-memory [`CommandRunner`] for driving the firewall layer in tests.
#[derive(Default)]
pub struct MockRunner {
    state: Mutex<MockState>,
}

impl MockRunner {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the canned response for an exact command line.
    ///
    /// The key is `program` followed by its space-joined arguments,
    /// e.g. `"ip -o link show"`. Replaces any previous response.
    pub fn respond(&self, command_line: &str, output: CmdOutput) {
        self.state
            .lock()
            .unwrap()
            .canned
            .insert(command_line.to_string(), output);
    }

    /// Every command line seen so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls whose command line starts with `prefix`
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// The currently installed rules, in insertion order.
    ///
    /// Each entry is the canonical rule key: the firewall command plus
    /// all arguments except the operation flag.
    pub fn installed_rules(&self) -> Vec<String> {
        self.state.lock().unwrap().rules.clone()
    }

    /// Whether any installed rule contains the given fragment
    pub fn has_rule(&self, fragment: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .rules
            .iter()
            .any(|r| r.contains(fragment))
    }
}

/// Split an iptables-style invocation into its operation flag and the
/// canonical rule key (program + everything but the flag).
fn split_rule_op<'a>(program: &str, args: &[&'a str]) -> Option<(&'a str, String)> {
    let pos = args
        .iter()
        .position(|a| matches!(*a, "-C" | "-A" | "-D"))?;
    let mut key_parts = vec![program];
    key_parts.extend(args[..pos].iter().copied());
    key_parts.extend(args[pos + 1..].iter().copied());
    Some((args[pos], key_parts.join(" ")))
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let line = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };

        let mut state = self.state.lock().unwrap();
        state.calls.push(line.clone());

        if let Some(out) = state.canned.get(&line) {
            return Ok(out.clone());
        }

        if program == "iptables" || program == "ip6tables" {
            if let Some((op, key)) = split_rule_op(program, args) {
                return Ok(match op {
                    "-C" => CmdOutput::status(state.rules.contains(&key)),
                    "-A" => {
                        state.rules.push(key);
                        CmdOutput::status(true)
                    }
                    _ => match state.rules.iter().position(|r| *r == key) {
                        Some(idx) => {
                            state.rules.remove(idx);
                            CmdOutput::status(true)
                        }
                        None => CmdOutput::status(false),
                    },
                });
            }
        }

        Ok(CmdOutput::ok(""))
    }
}
