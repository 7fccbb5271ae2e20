use crate::domain::{
    checkout::OrderBumpSelection,
    offer::{Offer, OrderBumpConfig},
};

/// The offer's configured upsell, if any.
pub fn configured_bump(offer: &Offer) -> Option<&OrderBumpConfig> {
    offer.order_bump.as_ref()
}

#[derive(Debug, Clone, PartialEq)]
pub enum BumpDecision<'a> {
    NotRequested,
    Selected(&'a OrderBumpConfig),
    /// Client asked for a bump the offer does not have. Dropped, not fatal.
    Mismatch { requested: String },
}

pub fn resolve_selection<'a>(
    offer: &'a Offer,
    selection: Option<&OrderBumpSelection>,
) -> BumpDecision<'a> {
    let Some(selection) = selection.filter(|s| s.selected) else {
        return BumpDecision::NotRequested;
    };

    match configured_bump(offer) {
        Some(bump) if bump.id == selection.id.trim() => BumpDecision::Selected(bump),
        configured => {
            tracing::warn!(
                offer_id = %offer.id,
                requested = %selection.id,
                configured = configured.map(|b| b.id.as_str()).unwrap_or("<none>"),
                "order bump mismatch, dropping bump"
            );
            BumpDecision::Mismatch {
                requested: selection.id.clone(),
            }
        }
    }
}
