#[cfg(test)]
mod tests {
    use crate::ident::object_identifier;
    use crate::types::*;

    #[test]
    fn service_full_name_joins_host_and_short_name() {
        let name = Service::full_name("web1", "http");
        assert_eq!(name.as_str(), "web1!http");
    }

    #[test]
    fn object_identifier_is_stable_for_equal_names() {
        let a = object_identifier("web1");
        let b = object_identifier("web1");
        assert_eq!(a, b);
        assert_ne!(a, object_identifier("web2"));
    }

    #[test]
    fn object_kind_reflection_names_are_lowercase() {
        for kind in ObjectKind::all() {
            assert_eq!(kind.reflection_name(), kind.reflection_name().to_lowercase());
        }
    }

    #[test]
    fn comment_row_typename_splits_host_and_service() {
        let host_comment = ConfigObject::Comment(Comment {
            meta: ObjectMeta::new("c1"),
            host: ObjectName::new("h1"),
            service: None,
            author: "op".into(),
            text: "note".into(),
            entry_type: CommentEntryType::UserComment,
            entry_time: 0.0,
            persistent: false,
            expire_time: None,
        });
        assert_eq!(host_comment.row_typename(), "hostcomment");
    }
}
