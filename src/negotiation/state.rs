//! Inquiry state machine
//!
//! Guard rules and transitions, applied to an in-memory [`Inquiry`]. Each
//! method either mutates the inquiry and succeeds, or leaves it untouched and
//! returns the rule that fired. Participation and terminal-state checks are
//! done by the engine before any of these run.

use super::types::NegotiationError;
use crate::protocol::StatusChange;
use crate::storage::{Inquiry, InquiryStatus, Price, UserId};

type Guarded<T> = std::result::Result<T, NegotiationError>;

impl Inquiry {
    /// Reject anything on a purchased, cancelled or closed inquiry
    pub fn ensure_open(&self) -> Guarded<()> {
        if self.status.is_terminal() {
            return Err(NegotiationError::ThreadClosed(self.id));
        }
        Ok(())
    }

    /// Place a new offer, replacing any outstanding one
    ///
    /// Either participant may offer; `PRICE_OFFER` vs `PRICE_COUNTER` is
    /// presentational only.
    pub fn place_offer(&mut self, by: UserId, amount: Price) -> Guarded<()> {
        match self.status {
            InquiryStatus::Active | InquiryStatus::Negotiating => {}
            InquiryStatus::Agreed => {
                return Err(NegotiationError::invalid(
                    "price already agreed, no further offers",
                ))
            }
            _ => return Err(NegotiationError::ThreadClosed(self.id)),
        }

        self.offered_price = Some(amount);
        self.offered_by = Some(by);
        self.status = InquiryStatus::Negotiating;
        Ok(())
    }

    /// The outstanding offer, if `by` is allowed to answer it
    fn answerable_offer(&self, by: UserId, verb: &str) -> Guarded<Price> {
        let offer = match (self.status, self.offered_price) {
            (InquiryStatus::Negotiating, Some(offer)) => offer,
            _ => {
                return Err(NegotiationError::invalid(format!(
                    "no outstanding offer to {}",
                    verb
                )))
            }
        };

        if self.offered_by == Some(by) {
            return Err(NegotiationError::NotYourTurn(format!(
                "cannot {} your own offer",
                verb
            )));
        }

        Ok(offer)
    }

    /// Accept the outstanding offer; returns the agreed price
    ///
    /// When `amount` is given it must equal the offer.
    pub fn accept_offer(&mut self, by: UserId, amount: Option<Price>) -> Guarded<Price> {
        let offer = self.answerable_offer(by, "accept")?;

        if let Some(amount) = amount {
            if amount != offer {
                return Err(NegotiationError::invalid(format!(
                    "accepted amount {} does not match the outstanding offer of {}",
                    amount, offer
                )));
            }
        }

        self.agreed_price = Some(offer);
        self.offered_price = None;
        self.offered_by = None;
        self.status = InquiryStatus::Agreed;
        Ok(offer)
    }

    /// Reject the outstanding offer; returns the rejected amount
    ///
    /// The inquiry stays in `NEGOTIATING` with no outstanding offer.
    pub fn reject_offer(&mut self, by: UserId) -> Guarded<Price> {
        let offer = self.answerable_offer(by, "reject")?;

        self.offered_price = None;
        self.offered_by = None;
        Ok(offer)
    }

    /// Check a purchase request; the inquiry itself does not change
    pub fn request_purchase(&self, by: UserId, final_price: Price) -> Guarded<Price> {
        if by != self.client_id {
            return Err(NegotiationError::invalid(
                "only the client can request a purchase",
            ));
        }

        let agreed = self.agreed_price_for("request a purchase")?;
        if final_price != agreed {
            return Err(NegotiationError::invalid(format!(
                "final price {} does not match the agreed price of {}",
                final_price, agreed
            )));
        }

        Ok(agreed)
    }

    /// Confirm the sale; returns the agreed price
    pub fn confirm_purchase(&mut self, by: UserId) -> Guarded<Price> {
        if by != self.owner_id {
            return Err(NegotiationError::invalid(
                "only the owner can confirm a purchase",
            ));
        }

        let agreed = self.agreed_price_for("confirm a purchase")?;
        self.status = InquiryStatus::Purchased;
        Ok(agreed)
    }

    fn agreed_price_for(&self, what: &str) -> Guarded<Price> {
        match (self.status, self.agreed_price) {
            (InquiryStatus::Agreed, Some(agreed)) => Ok(agreed),
            (status, _) => Err(NegotiationError::invalid(format!(
                "cannot {} while {}",
                what, status
            ))),
        }
    }

    /// Cancel or close the inquiry at `now`
    pub fn finish(&mut self, change: StatusChange, now: i64) -> Guarded<()> {
        self.ensure_open()?;

        self.status = change.status();
        self.offered_price = None;
        self.offered_by = None;
        self.closed_at = Some(now);
        Ok(())
    }
}
