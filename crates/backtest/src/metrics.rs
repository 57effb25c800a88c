use autotrader_core::instrument::round_to;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Summary of a simulated portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub initial_balance: Decimal,
    pub current_balance: Decimal,
    pub total_pnl: Decimal,
    pub total_pnl_percent: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent, 1 dp
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Largest peak-to-trough fall of the equity curve, percent, 2 dp
    pub max_drawdown: f64,
}

/// Running balance and equity curve of a simulated account.
#[derive(Debug, Clone)]
pub struct PortfolioTracker {
    initial_balance: Decimal,
    equity_curve: Vec<Decimal>,
    gross_profit: Decimal,
    gross_loss: Decimal,
    wins: usize,
    losses: usize,
}

impl PortfolioTracker {
    /// Creates a tracker whose equity curve starts at `initial_balance`.
    #[must_use]
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            equity_curve: vec![initial_balance],
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            wins: 0,
            losses: 0,
        }
    }

    #[must_use]
    pub fn balance(&self) -> Decimal {
        self.equity_curve
            .last()
            .copied()
            .unwrap_or(self.initial_balance)
    }

    /// Equity after each trade, starting with the initial balance.
    #[must_use]
    pub fn equity_curve(&self) -> &[Decimal] {
        &self.equity_curve
    }

    /// Applies a closed trade and returns the new balance.
    pub fn add_trade(&mut self, pnl: Decimal) -> Decimal {
        let new_equity = self.balance() + pnl;
        self.equity_curve.push(new_equity);

        if pnl > Decimal::ZERO {
            self.wins += 1;
            self.gross_profit += pnl;
        } else if pnl < Decimal::ZERO {
            self.losses += 1;
            self.gross_loss -= pnl;
        }
        new_equity
    }

    #[must_use]
    pub fn stats(&self) -> PortfolioStats {
        let current_balance = self.balance().round_dp(2);
        let total_trades = self.equity_curve.len() - 1;

        #[allow(clippy::cast_precision_loss)]
        let win_rate = if total_trades > 0 {
            round_to(self.wins as f64 / total_trades as f64 * 100.0, 1)
        } else {
            0.0
        };

        let total_pnl_percent = if self.initial_balance.is_zero() {
            0.0
        } else {
            let ratio = (current_balance / self.initial_balance - Decimal::ONE)
                * Decimal::ONE_HUNDRED;
            round_to(ratio.to_f64().unwrap_or(0.0), 2)
        };

        let profit_factor = if self.gross_loss > Decimal::ZERO {
            (self.gross_profit / self.gross_loss).to_f64().unwrap_or(0.0)
        } else {
            self.gross_profit.to_f64().unwrap_or(0.0)
        };

        PortfolioStats {
            initial_balance: self.initial_balance,
            current_balance,
            total_pnl: current_balance - self.initial_balance,
            total_pnl_percent,
            total_trades,
            winning_trades: self.wins,
            losing_trades: self.losses,
            win_rate,
            profit_factor: round_to(profit_factor, 2),
            max_drawdown: round_to(self.calculate_max_drawdown(), 2),
        }
    }

    fn calculate_max_drawdown(&self) -> f64 {
        let mut max_drawdown = Decimal::ZERO;
        let mut peak = self.initial_balance;

        for &equity in &self.equity_curve {
            if equity > peak {
                peak = equity;
            }
            if peak > Decimal::ZERO {
                let drawdown = (peak - equity) / peak * Decimal::ONE_HUNDRED;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        max_drawdown.to_f64().unwrap_or(0.0)
    }
}
