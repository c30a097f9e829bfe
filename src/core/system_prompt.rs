// src/core/system_prompt.rs — Assembles the role-conditioned system prompt sent with every run

use crate::auth::UserIdentity;

/// Build the system prompt injected into every assistant run.
///
/// Two shapes, selected by role:
///   - administrator: all-vendor scope, platform-wide analytics
///   - vendor: every query restricted to the vendor's slug
///
/// Vendor scoping is enforced ONLY by these instructions — the remote
/// workflow holds no server-side authorization check. Treat the vendor
/// prompt as a convention, not a guarantee.
pub fn build_system_prompt(identity: &UserIdentity) -> String {
    let mut prompt = String::with_capacity(2048);

    if identity.is_administrator() {
        append_admin_identity(&mut prompt);
    } else {
        append_vendor_identity(&mut prompt, identity.vendor_slug.as_deref());
    }

    append_privacy_rules(&mut prompt);

    prompt
}

// ─── Section builders ───────────────────────────────────────────────────────

fn append_admin_identity(prompt: &mut String) {
    prompt.push_str(
        "You are a highly intelligent auction and inventory assistant for \
         marketplace administrators. You have access to ALL vendor data and \
         can provide comprehensive insights across the entire platform.\n\n\
         Your responsibilities include:\n\
         * Generate secure and optimized SQL queries for orders and products across all vendors\n\
         * Provide data analytics, reporting, and insights for administrators\n\
         * Assist with inventory management, pricing analysis, and auction oversight\n\
         * Generate charts and visualizations for better data understanding\n\
         * Look up market values for listed equipment\n\n",
    );
}

fn append_vendor_identity(prompt: &mut String, vendor_slug: Option<&str>) {
    let slug = vendor_slug.unwrap_or("unknown");
    prompt.push_str(&format!(
        "You are a highly intelligent auction and inventory assistant \
         providing SQL queries and database insights for marketplace \
         vendors. Your vendor slug is: {slug}\n\n\
         Your responsibilities include:\n\
         * Generate secure and optimized SQL queries for orders and products filtered by vendor slug\n\
         * Provide inventory insights, sales analytics, and auction management assistance\n\
         * Generate charts and visualizations for better understanding of vendor data\n\
         * Look up market values for listed equipment\n\n\
         **Important Restrictions:**\n\
         * ALL queries MUST be filtered by vendor slug: {slug}\n\
         * NEVER retrieve data from other vendors\n\n",
    ));
}

fn append_privacy_rules(prompt: &mut String) {
    prompt.push_str(
        "**Data Privacy:** NEVER retrieve or display customer personal \
         information such as names, addresses, phone numbers, or any PII. \
         Only use anonymized order IDs and aggregated data.\n\
         **User Data Restriction:** NEVER query or display user account \
         data, login information, or any user table data.\n",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserIdentity;

    fn vendor_identity(slug: Option<&str>) -> UserIdentity {
        UserIdentity {
            email: "v@example.com".into(),
            vendor_slug: slug.map(String::from),
            vendor_id: 7,
            roles: ["vendor".to_string()].into_iter().collect(),
        }
    }

    fn admin_identity() -> UserIdentity {
        UserIdentity {
            email: "admin@example.com".into(),
            vendor_slug: None,
            vendor_id: 1,
            roles: ["administrator".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn test_admin_prompt_has_all_vendor_scope() {
        let p = build_system_prompt(&admin_identity());
        assert!(p.contains("ALL vendor data"));
        assert!(!p.contains("MUST be filtered by vendor slug"));
    }

    #[test]
    fn test_vendor_prompt_pins_slug() {
        let p = build_system_prompt(&vendor_identity(Some("vendor-co")));
        assert!(p.contains("Your vendor slug is: vendor-co"));
        assert!(p.contains("MUST be filtered by vendor slug: vendor-co"));
    }

    #[test]
    fn test_vendor_prompt_without_slug_says_unknown() {
        let p = build_system_prompt(&vendor_identity(None));
        assert!(p.contains("Your vendor slug is: unknown"));
    }

    #[test]
    fn test_both_prompts_carry_privacy_rules() {
        for identity in [admin_identity(), vendor_identity(Some("x"))] {
            let p = build_system_prompt(&identity);
            assert!(p.contains("NEVER retrieve or display customer personal"));
            assert!(p.contains("user table data"));
        }
    }
}
