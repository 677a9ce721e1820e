//! The fixed registry of specialist stages activated conditionally by a plan.
//!
//! The set is closed and stateless; a registry value is freely shared across
//! runs. Name matching is case-insensitive and alias-aware so plans can
//! address a specialist as `"Finance-Agent"` or `"financial_analyst_agent"`
//! interchangeably.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the domain-expert stages a plan step can be assigned to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistId {
    Financial,
    Risk,
    Market,
    Compliance,
}

impl SpecialistId {
    pub const ALL: [SpecialistId; 4] = [
        SpecialistId::Financial,
        SpecialistId::Risk,
        SpecialistId::Market,
        SpecialistId::Compliance,
    ];

    /// Canonical stage identifier handed to the stage-invocation collaborator
    /// and tagged on published output events.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialistId::Financial => "financial_analyst_agent",
            SpecialistId::Risk => "risk_analyst_agent",
            SpecialistId::Market => "market_analyst_agent",
            SpecialistId::Compliance => "compliance_analyst_agent",
        }
    }

    /// Accepted name variants, compared lowercase.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            SpecialistId::Financial => &[
                "financial analyst agent",
                "financial_analyst_agent",
                "finance-agent",
                "finance agent",
            ],
            SpecialistId::Risk => &[
                "risk analyst agent",
                "risk_analyst_agent",
                "risk-agent",
                "risk agent",
            ],
            SpecialistId::Market => &[
                "market analyst agent",
                "market_analyst_agent",
                "market-agent",
                "market agent",
            ],
            SpecialistId::Compliance => &[
                "compliance analyst agent",
                "compliance_analyst_agent",
                "compliance-agent",
                "compliance agent",
            ],
        }
    }

    /// Role instructions passed to the invoker for this stage.
    pub fn instructions(&self) -> &'static str {
        match self {
            SpecialistId::Financial => {
                "You are a financial analyst agent. Analyze the investment scenario and \
                 respond with well-reasoned insights on financial metrics, market conditions, \
                 and recommendations, in markdown."
            }
            SpecialistId::Risk => {
                "You are a risk analyst agent. Evaluate the scenario and respond with a \
                 comprehensive assessment of market, credit, operational, and liquidity \
                 risks, in markdown."
            }
            SpecialistId::Market => {
                "You are a market analyst agent. Evaluate the scenario and respond with a \
                 comprehensive analysis of market trends, economic indicators, and external \
                 factors, in markdown."
            }
            SpecialistId::Compliance => {
                "You are a compliance analyst agent. Evaluate the scenario and respond with \
                 a comprehensive analysis of regulatory and industry-standard compliance \
                 impacts, in markdown."
            }
        }
    }
}

impl fmt::Display for SpecialistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed specialist set, exposed as a value so callers pass the registry
/// explicitly rather than reaching for a global.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpecialistRegistry;

impl SpecialistRegistry {
    pub fn members(&self) -> &'static [SpecialistId] {
        &SpecialistId::ALL
    }

    /// Resolve a plan's `assigned_agent` name to a specialist, matching any
    /// alias case-insensitively. Unknown names resolve to `None`; that is a
    /// legitimate no-op outcome, not an error.
    pub fn resolve(&self, name: &str) -> Option<SpecialistId> {
        let needle = name.trim().to_lowercase();
        SpecialistId::ALL
            .into_iter()
            .find(|specialist| specialist.aliases().contains(&needle.as_str()))
    }
}
