use crate::dom::PageDom;

/// Profile action buttons the Rolodink button is placed next to, most
/// specific first. LinkedIn ships several layouts at once so the list is
/// tried in order.
pub const ANCHOR_SELECTORS: &[&str] = &[
    r#"button[aria-label*="Message"]"#,
    r#"button[aria-label*="Connect"]"#,
    r#"button[aria-label*="Follow"]"#,
    r#"a[aria-label*="Message"]"#,
    r#"button[data-control-name="message"]"#,
    r#"button[data-control-name="connect"]"#,
    r#"button[data-control-name="follow"]"#,
    ".pvs-profile-actions button.artdeco-button--primary",
    ".pv-top-card-v2-ctas button.artdeco-button--primary",
];

/// Returns the first element matching [`ANCHOR_SELECTORS`], or `None` when
/// the action bar has not rendered yet. The observer loop calls this again on
/// the next mutation batch.
pub fn locate_anchor<D: PageDom>(dom: &D) -> Option<D::Element> {
    ANCHOR_SELECTORS
        .iter()
        .find_map(|selector| dom.query_selector(selector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fake::FakeDom;

    #[test]
    fn returns_none_without_action_bar() {
        let dom = FakeDom::new("https://www.linkedin.com/in/jdoe/", "John Doe | LinkedIn");
        dom.add(None, "h1", &["h1"], "John Doe");

        assert_eq!(locate_anchor(&dom), None);
        assert_eq!(dom.queries.get(), ANCHOR_SELECTORS.len());
    }

    #[test]
    fn prefers_earlier_selectors() {
        let dom = FakeDom::new("https://www.linkedin.com/in/jdoe/", "John Doe | LinkedIn");
        let bar = dom.add(None, "div", &[".pvs-profile-actions"], "");
        let _primary = dom.add(
            Some(bar),
            "button",
            &[".pvs-profile-actions button.artdeco-button--primary"],
            "More",
        );
        let follow = dom.add(Some(bar), "button", &[r#"button[aria-label*="Follow"]"#], "Follow");

        assert_eq!(locate_anchor(&dom), Some(follow));
    }

    #[test]
    fn falls_back_to_layout_classes() {
        let dom = FakeDom::new("https://www.linkedin.com/in/jdoe/", "John Doe | LinkedIn");
        let ctas = dom.add(None, "div", &[".pv-top-card-v2-ctas"], "");
        let primary = dom.add(
            Some(ctas),
            "button",
            &[".pv-top-card-v2-ctas button.artdeco-button--primary"],
            "Connect",
        );

        assert_eq!(locate_anchor(&dom), Some(primary));
    }
}
