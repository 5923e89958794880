    use super::*;

    #[test]
    fn test_register_and_validate_token() {
        let store = AuthStore::new(true);
        let hash = store
            .register_token("ada-session", "ada@example.com", "browser")
            .unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(store.active_token_count(), 1);

        let ctx = store.validate_token("ada-session").unwrap();
        assert_eq!(ctx.user_id, "ada@example.com");
        assert_eq!(ctx.method, AuthMethod::SessionToken);
        assert!(ctx.has_scope(&Scope::CanvasWrite));
        assert!(!ctx.has_scope(&Scope::Admin));
    }

    #[test]
    fn test_registered_provider_token() {
        let store = AuthStore::new(true);
        store
            .register_token("provider-session-abc", "grace@example.com", "seed")
            .unwrap();

        let ctx = store.validate_token("provider-session-abc").unwrap();
        assert_eq!(ctx.user_id, "grace@example.com");
    }

    #[test]
    fn test_register_rejects_blank_values() {
        let store = AuthStore::new(true);
        assert!(store.register_token("  ", "user", "x").is_err());
        assert!(store.register_token("token", "", "x").is_err());
    }

    #[test]
    fn test_invalid_token() {
        let store = AuthStore::new(true);
        let result = store.validate_token("invalid_token");
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[test]
    fn test_empty_token() {
        let store = AuthStore::new(true);
        let result = store.validate_token("");
        assert!(matches!(result, Err(AuthError::MissingCredentials)));
    }

    #[test]
    fn test_reregistering_replaces_owner() {
        let store = AuthStore::new(true);
        store.register_token("shared", "user1", "old").unwrap();
        store.register_token("shared", "user2", "new").unwrap();

        assert_eq!(store.active_token_count(), 1);
        assert_eq!(store.validate_token("shared").unwrap().user_id, "user2");
    }

    #[test]
    fn test_disabled_auth_is_anonymous_admin() {
        let store = AuthStore::new(false);
        let ctx = store.validate_token("anything").unwrap();
        assert_eq!(ctx.user_id, ANONYMOUS_USER);
        assert_eq!(ctx.method, AuthMethod::Anonymous);
        assert!(ctx.has_scope(&Scope::Admin));
    }

    #[test]
    fn test_admins_get_admin_scope() {
        let store = AuthStore::new(true).with_admins(["root@example.com"]);
        store.register_token("ops-token", "root@example.com", "ops").unwrap();

        let ctx = store.validate_token("ops-token").unwrap();
        assert!(ctx.has_scope(&Scope::Admin));
        assert!(ctx.has_scope(&Scope::CanvasRead));
    }

    #[test]
    fn test_proxy_identity() {
        let store = AuthStore::new(true).with_proxy_header("X-Auth-Request-Email");
        assert_eq!(store.proxy_header(), Some("x-auth-request-email"));

        let ctx = store
            .authenticate_proxy_identity(" lin@example.com ")
            .unwrap();
        assert_eq!(ctx.user_id, "lin@example.com");
        assert!(matches!(ctx.method, AuthMethod::ProxyHeader { .. }));

        let result = store.authenticate_proxy_identity("");
        assert!(matches!(result, Err(AuthError::MissingCredentials)));
    }

    #[test]
    fn test_proxy_identity_requires_configured_header() {
        let store = AuthStore::new(true);
        let result = store.authenticate_proxy_identity("lin@example.com");
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[test]
    fn test_require_scope() {
        let ctx = AuthContext {
            user_id: "user1".to_string(),
            method: AuthMethod::SessionToken,
            scopes: vec![Scope::CanvasRead],
        };

        assert!(ctx.require_scope(&Scope::CanvasRead).is_ok());
        let err = ctx.require_scope(&Scope::CanvasWrite).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient scope: requires canvas_write");
    }
