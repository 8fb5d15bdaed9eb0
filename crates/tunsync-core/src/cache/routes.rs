// # Route Table Cache
//
// In-memory mirror of the tunnel's ordered ingress rule list. All route
// reconciliation happens against this cache; a separate publish pushes the
// whole list back to the remote in one replace.
//
// ## Catch-all invariant
//
// The table ends with a block of one or more catch-all rules (no hostname).
// That block is immutable: reconciliation never reorders, duplicates or
// removes it, and every named rule is inserted strictly before it. The
// boundary is computed and validated once at construction; a list without a
// trailing catch-all, or with a named rule after one, is rejected loudly
// instead of guessing an insertion point.

use crate::error::{Error, Result};
use crate::traits::IngressRule;

/// Effect of one route-table mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEffect {
    /// A new rule was inserted before the catch-all block
    Inserted,
    /// An existing rule was replaced in place
    Replaced,
    /// An existing rule was removed
    Removed,
    /// Nothing to do; the table already matched
    Unchanged,
}

/// Ordered ingress rule list with a validated catch-all boundary
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTable {
    rules: Vec<IngressRule>,
    /// Index of the first catch-all rule; named rules live in
    /// `rules[..catch_all_start]`
    catch_all_start: usize,
}

impl RouteTable {
    /// Build a table from the remote rule list, validating its shape
    pub fn from_rules(rules: Vec<IngressRule>) -> Result<Self> {
        let catch_all_start = rules
            .iter()
            .position(IngressRule::is_catch_all)
            .ok_or_else(|| Error::route_table("ingress list has no trailing catch-all rule"))?;

        if rules[catch_all_start..].iter().any(|r| !r.is_catch_all()) {
            return Err(Error::route_table(
                "named ingress rule found after the catch-all block",
            ));
        }

        Ok(Self {
            rules,
            catch_all_start,
        })
    }

    /// The full ordered rule list, named rules first, catch-all block last
    pub fn rules(&self) -> &[IngressRule] {
        &self.rules
    }

    /// The immutable trailing catch-all block
    pub fn catch_all(&self) -> &[IngressRule] {
        &self.rules[self.catch_all_start..]
    }

    /// Look up the named rule for a hostname
    pub fn find(&self, hostname: &str) -> Option<&IngressRule> {
        self.position(hostname).map(|idx| &self.rules[idx])
    }

    /// Ensure a named rule routing `hostname` to `service` exists
    ///
    /// Inserts before the catch-all block when absent, replaces in place
    /// (preserving the rule's position) when the service changed, and
    /// reports `Unchanged` when an equal rule is already present.
    pub fn upsert(&mut self, hostname: &str, service: &str) -> RouteEffect {
        let rule = IngressRule::named(hostname, service);
        match self.position(hostname) {
            Some(idx) => {
                if self.rules[idx] == rule {
                    RouteEffect::Unchanged
                } else {
                    self.rules[idx] = rule;
                    RouteEffect::Replaced
                }
            }
            None => {
                self.rules.insert(self.catch_all_start, rule);
                self.catch_all_start += 1;
                RouteEffect::Inserted
            }
        }
    }

    /// Remove the named rule for a hostname, if present
    pub fn remove(&mut self, hostname: &str) -> bool {
        match self.position(hostname) {
            Some(idx) => {
                self.rules.remove(idx);
                self.catch_all_start -= 1;
                true
            }
            None => false,
        }
    }

    fn position(&self, hostname: &str) -> Option<usize> {
        self.rules[..self.catch_all_start]
            .iter()
            .position(|rule| rule.hostname.as_deref() == Some(hostname))
    }
}
