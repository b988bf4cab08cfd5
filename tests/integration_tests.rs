use academy::error::{service_error, ServiceError};
use academy::models::{
    CourseInput, ItemBody, ItemKind, ItemUpdate, ModuleFormRow, NewItem, Registration, UserType,
};
use academy::services::{
    api_token, auth, contents, courses, enrollment, modules, series,
};
use academy::Database;
use std::collections::BTreeMap;
use std::path::Path;

fn create_test_db() -> Database {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let id: u32 = rng.gen();
    let name = format!("test_db_{}", id);

    let db = Database::open_memory(&name).expect("Failed to create test database");
    db.migrate().expect("Failed to run migrations");
    db
}

// Meets the password rules: 8+ chars, upper and lower case, a digit.
const TEST_PASSWORD: &str = "Password123";
const WRONG_PASSWORD: &str = "WrongPass456";

fn instructor(db: &Database, email: &str) -> i64 {
    auth::create_user(db, email, "Instructor", TEST_PASSWORD, UserType::Instructor)
        .expect("Failed to create instructor")
}

fn student(db: &Database, email: &str) -> i64 {
    auth::create_user(db, email, "Student", TEST_PASSWORD, UserType::Student)
        .expect("Failed to create student")
}

fn course(db: &Database, owner_id: i64, series_id: i64, title: &str) -> i64 {
    let input = CourseInput {
        series_id,
        title: title.to_string(),
        overview: format!("All about {}", title),
    };
    courses::create_course(db, owner_id, &input).expect("Failed to create course")
}

fn text_item(title: &str, body: &str) -> NewItem {
    NewItem {
        title: title.to_string(),
        body: ItemBody::new(ItemKind::Text, body.to_string()),
    }
}

fn count(db: &Database, table: &str) -> i64 {
    let conn = db.get().unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

fn field_error_keys(err: &anyhow::Error) -> Vec<String> {
    match service_error(err) {
        Some(ServiceError::Validation(fields)) => {
            let json = serde_json::to_value(fields).unwrap();
            json.as_object().unwrap().keys().cloned().collect()
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

mod auth_integration_tests {
    use super::*;

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.to_string(),
            name: "Ada".to_string(),
            password1: TEST_PASSWORD.to_string(),
            password2: TEST_PASSWORD.to_string(),
            user_type: UserType::Student,
        }
    }

    #[test]
    fn test_register_and_authenticate() {
        let db = create_test_db();
        let id = auth::register(&db, &registration("ada@example.com")).unwrap();
        assert!(id > 0);

        let user = auth::authenticate(&db, "ada@example.com", TEST_PASSWORD)
            .unwrap()
            .expect("User should be found");
        assert_eq!(user.name, "Ada");
        assert_eq!(user.user_type, UserType::Student);

        assert!(auth::authenticate(&db, "ada@example.com", WRONG_PASSWORD)
            .unwrap()
            .is_none());
        assert!(auth::authenticate(&db, "nobody@example.com", TEST_PASSWORD)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_register_duplicate_email() {
        let db = create_test_db();
        auth::register(&db, &registration("ada@example.com")).unwrap();

        let err = auth::register(&db, &registration("ada@EXAMPLE.com")).unwrap_err();
        assert_eq!(field_error_keys(&err), vec!["email"]);
        assert!(err.to_string().contains(auth::DUPLICATE_EMAIL));
    }

    #[test]
    fn test_register_reports_every_bad_field() {
        let db = create_test_db();
        let form = Registration {
            email: "not-an-email".to_string(),
            name: "  ".to_string(),
            password1: "short".to_string(),
            password2: "different".to_string(),
            user_type: UserType::Instructor,
        };
        let err = auth::register(&db, &form).unwrap_err();
        assert_eq!(
            field_error_keys(&err),
            vec!["email", "name", "password1", "password2"]
        );
        assert!(!auth::has_users(&db).unwrap());
    }

    #[test]
    fn test_list_users_by_type() {
        let db = create_test_db();
        instructor(&db, "teach@example.com");
        student(&db, "learn1@example.com");
        student(&db, "learn2@example.com");

        assert_eq!(auth::list_users(&db, None).unwrap().len(), 3);
        assert_eq!(auth::list_students(&db).unwrap().len(), 2);
        assert_eq!(auth::list_instructors(&db).unwrap().len(), 1);
    }

    #[test]
    fn test_sessions() {
        let db = create_test_db();
        let id = student(&db, "learn@example.com");

        let token = auth::create_session(&db, id, 7).unwrap();
        let user = auth::validate_session(&db, &token).unwrap().unwrap();
        assert_eq!(user.id, id);

        auth::delete_session(&db, &token).unwrap();
        assert!(auth::validate_session(&db, &token).unwrap().is_none());
        assert!(auth::validate_session(&db, "bogus").unwrap().is_none());
    }

    #[test]
    fn test_api_tokens() {
        let db = create_test_db();
        let id = student(&db, "learn@example.com");

        let key = api_token::create_token(&db, id).unwrap();
        assert!(key.starts_with("ak_"));
        assert_eq!(api_token::validate_token(&db, &key).unwrap().unwrap().id, id);
        assert!(api_token::validate_token(&db, "ak_unknown").unwrap().is_none());

        assert!(api_token::revoke_token(&db, &key).unwrap());
        assert!(api_token::validate_token(&db, &key).unwrap().is_none());
    }

    #[test]
    fn test_update_password() {
        let db = create_test_db();
        student(&db, "learn@example.com");
        auth::update_password(&db, "learn@example.com", "Changed456").unwrap();
        assert!(auth::authenticate(&db, "learn@example.com", "Changed456")
            .unwrap()
            .is_some());
        assert!(auth::update_password(&db, "ghost@example.com", "Changed456").is_err());
    }
}

mod series_integration_tests {
    use super::*;

    #[test]
    fn test_create_series_slugs() {
        let db = create_test_db();
        let id = series::create_series(&db, "Web Development", None).unwrap();
        let created = series::get_series_by_id(&db, id).unwrap().unwrap();
        assert_eq!(created.slug, "web-development");

        let err = series::create_series(&db, "Web development again", Some("web-development"))
            .unwrap_err();
        assert_eq!(field_error_keys(&err), vec!["slug"]);

        assert!(series::create_series(&db, "  ", None).is_err());
        assert!(series::create_series(&db, "Bad", Some("Bad Slug")).is_err());
    }

    #[test]
    fn test_series_counts_and_delete() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let programming = series::create_series(&db, "Programming", None).unwrap();
        let maths = series::create_series(&db, "Mathematics", None).unwrap();
        course(&db, owner, programming, "Rust");
        course(&db, owner, programming, "Python");

        let counted = series::list_series_with_counts(&db).unwrap();
        let by_slug = |slug: &str| {
            counted
                .iter()
                .find(|s| s.series.slug == slug)
                .map(|s| s.total_courses)
        };
        assert_eq!(by_slug("programming"), Some(2));
        assert_eq!(by_slug("mathematics"), Some(0));

        assert!(series::delete_series(&db, maths).unwrap());
        assert!(!series::delete_series(&db, maths).unwrap());
        assert!(series::get_series_by_slug(&db, "mathematics").unwrap().is_none());
    }
}

mod course_integration_tests {
    use super::*;

    #[test]
    fn test_create_course_derives_slug() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Django for Beginners");

        let created = courses::get_course(&db, id).unwrap().unwrap();
        assert_eq!(created.slug, "django-for-beginners");
        assert_eq!(created.owner_id, Some(owner));
        assert_eq!(
            courses::get_course_by_slug(&db, "django-for-beginners").unwrap().unwrap().id,
            id
        );
    }

    #[test]
    fn test_course_validation() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let input = CourseInput {
            series_id: 999,
            title: String::new(),
            overview: String::new(),
        };
        let err = courses::create_course(&db, owner, &input).unwrap_err();
        assert_eq!(field_error_keys(&err), vec!["series_id", "title"]);
    }

    #[test]
    fn test_title_limit_counts_characters() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let input = CourseInput {
            series_id: s,
            title: "é".repeat(200),
            overview: String::new(),
        };
        let id = courses::create_course(&db, owner, &input).unwrap();

        let too_long = CourseInput {
            title: "é".repeat(201),
            ..input
        };
        let err = courses::create_course(&db, owner, &too_long).unwrap_err();
        assert_eq!(field_error_keys(&err), vec!["title"]);

        let module = modules::create_module(&db, id, &"ü".repeat(200), "", None).unwrap();
        assert_eq!(module.title.chars().count(), 200);
        let err = modules::create_module(&db, id, &"ü".repeat(201), "", None).unwrap_err();
        assert_eq!(field_error_keys(&err), vec!["title"]);
    }

    #[test]
    fn test_courses_are_scoped_to_owner() {
        let db = create_test_db();
        let alice = instructor(&db, "alice@example.com");
        let bob = instructor(&db, "bob@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let alices = course(&db, alice, s, "Rust");
        course(&db, bob, s, "Go");

        let owned = courses::list_owned_courses(&db, alice).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].course.id, alices);
        assert_eq!(owned[0].series_title, "Programming");

        let err = courses::get_owned_course(&db, bob, alices).unwrap_err();
        assert!(matches!(service_error(&err), Some(ServiceError::NotFound(_))));

        let edit = CourseInput {
            series_id: s,
            title: "Hijacked".to_string(),
            overview: String::new(),
        };
        assert!(courses::update_course(&db, bob, alices, &edit).is_err());
        assert!(courses::delete_course(&db, Path::new("/nonexistent"), bob, alices).is_err());
        assert_eq!(courses::get_course(&db, alices).unwrap().unwrap().title, "Rust");
    }

    #[test]
    fn test_update_course_follows_title() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Rust");

        let edit = CourseInput {
            series_id: s,
            title: "Advanced Rust".to_string(),
            overview: "Lifetimes".to_string(),
        };
        courses::update_course(&db, owner, id, &edit).unwrap();
        let updated = courses::get_course(&db, id).unwrap().unwrap();
        assert_eq!(updated.slug, "advanced-rust");
        assert_eq!(updated.overview, "Lifetimes");
    }

    #[test]
    fn test_catalog_summaries() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let programming = series::create_series(&db, "Programming", None).unwrap();
        let maths = series::create_series(&db, "Mathematics", None).unwrap();
        let rust = course(&db, owner, programming, "Rust");
        course(&db, owner, maths, "Algebra");
        modules::create_module(&db, rust, "Ownership", "", None).unwrap();
        modules::create_module(&db, rust, "Traits", "", None).unwrap();

        assert_eq!(courses::list_course_summaries(&db, None).unwrap().len(), 2);
        let filtered = courses::list_course_summaries(&db, Some(programming)).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].total_modules, 2);
        assert_eq!(courses::count_courses(&db).unwrap(), 2);

        let with_modules = courses::course_with_modules(&db, rust).unwrap().unwrap();
        assert_eq!(with_modules.modules.len(), 2);
    }

    #[test]
    fn test_delete_course_leaves_no_items() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Rust");
        let module = modules::create_module(&db, id, "Ownership", "", None).unwrap();
        contents::create_item_content(&db, owner, module.id, &text_item("Intro", "# Hi")).unwrap();
        contents::create_item_content(
            &db,
            owner,
            module.id,
            &NewItem {
                title: "Talk".to_string(),
                body: ItemBody::new(ItemKind::Video, "https://www.youtube.com/watch?v=abc".to_string()),
            },
        )
        .unwrap();

        let media = tempfile::tempdir().unwrap();
        courses::delete_course(&db, media.path(), owner, id).unwrap();

        assert!(courses::get_course(&db, id).unwrap().is_none());
        assert_eq!(count(&db, "modules"), 0);
        assert_eq!(count(&db, "contents"), 0);
        assert_eq!(count(&db, "text_items"), 0);
        assert_eq!(count(&db, "video_items"), 0);
    }
}

mod module_integration_tests {
    use super::*;

    #[test]
    fn test_module_orders_are_per_course() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let first = course(&db, owner, s, "Rust");
        let second = course(&db, owner, s, "Go");

        let m1 = modules::create_module(&db, first, "One", "", None).unwrap();
        let m2 = modules::create_module(&db, first, "Two", "", None).unwrap();
        let other = modules::create_module(&db, second, "Other", "", None).unwrap();
        assert_eq!((m1.order, m2.order, other.order), (0, 1, 0));

        let explicit = modules::create_module(&db, first, "Later", "", Some(10)).unwrap();
        assert_eq!(explicit.order, 10);
        let next = modules::create_module(&db, first, "After", "", None).unwrap();
        assert_eq!(next.order, 11);

        let titles: Vec<String> = modules::list_modules(&db, first)
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, ["One", "Two", "Later", "After"]);
    }

    #[test]
    fn test_module_requires_title() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Rust");
        assert!(modules::create_module(&db, id, "   ", "", None).is_err());
    }

    #[test]
    fn test_reorder_modules_swaps_and_skips_foreign_rows() {
        let db = create_test_db();
        let alice = instructor(&db, "alice@example.com");
        let bob = instructor(&db, "bob@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let alices = course(&db, alice, s, "Rust");
        let bobs = course(&db, bob, s, "Go");
        let a0 = modules::create_module(&db, alices, "A0", "", None).unwrap();
        let a1 = modules::create_module(&db, alices, "A1", "", None).unwrap();
        let b0 = modules::create_module(&db, bobs, "B0", "", None).unwrap();

        let mut orders = BTreeMap::new();
        orders.insert(a0.id, 1);
        orders.insert(a1.id, 0);
        orders.insert(b0.id, 5);
        assert_eq!(modules::reorder_modules(&db, alice, &orders).unwrap(), 2);

        let titles: Vec<String> = modules::list_modules(&db, alices)
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, ["A1", "A0"]);
        assert_eq!(modules::get_module(&db, b0.id).unwrap().unwrap().order, 0);
    }

    #[test]
    fn test_reorder_collision_is_a_conflict() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Rust");
        let m0 = modules::create_module(&db, id, "Zero", "", None).unwrap();
        let m1 = modules::create_module(&db, id, "One", "", None).unwrap();

        let mut orders = BTreeMap::new();
        orders.insert(m0.id, 1);
        let err = modules::reorder_modules(&db, owner, &orders).unwrap_err();
        assert!(matches!(service_error(&err), Some(ServiceError::Conflict(_))));

        // The whole mapping was rolled back.
        assert_eq!(modules::get_module(&db, m0.id).unwrap().unwrap().order, 0);
        assert_eq!(modules::get_module(&db, m1.id).unwrap().unwrap().order, 1);
    }

    #[test]
    fn test_apply_formset() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Rust");
        let keep = modules::create_module(&db, id, "Keep", "", None).unwrap();
        let drop = modules::create_module(&db, id, "Drop", "", None).unwrap();

        let rows = vec![
            ModuleFormRow {
                id: Some(keep.id),
                title: "Kept and renamed".to_string(),
                description: "Updated".to_string(),
                delete: false,
            },
            ModuleFormRow {
                id: Some(drop.id),
                title: "Drop".to_string(),
                description: String::new(),
                delete: true,
            },
            ModuleFormRow {
                id: None,
                title: "Brand new".to_string(),
                description: String::new(),
                delete: false,
            },
            ModuleFormRow::default(),
        ];
        let media = tempfile::tempdir().unwrap();
        modules::apply_formset(&db, media.path(), owner, id, &rows).unwrap();

        let saved = modules::list_modules(&db, id).unwrap();
        let titles: Vec<&str> = saved.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Kept and renamed", "Brand new"]);
        assert_eq!(saved[0].description, "Updated");
        assert_eq!(saved[1].order, 1);
    }

    #[test]
    fn test_formset_delete_removes_uploaded_files() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Rust");
        let doomed = modules::create_module(&db, id, "Doomed", "", None).unwrap();
        let kept = modules::create_module(&db, id, "Kept", "", None).unwrap();

        let media = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(media.path().join("files")).unwrap();
        std::fs::write(media.path().join("files/doomed.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(media.path().join("files/kept.pdf"), b"%PDF-1.4").unwrap();
        for (module_id, path) in [(doomed.id, "files/doomed.pdf"), (kept.id, "files/kept.pdf")] {
            let item = NewItem {
                title: "Handout".to_string(),
                body: ItemBody::new(ItemKind::File, path.to_string()),
            };
            contents::create_item_content(&db, owner, module_id, &item).unwrap();
        }

        let rows = vec![
            ModuleFormRow {
                id: Some(doomed.id),
                title: "Doomed".to_string(),
                description: String::new(),
                delete: true,
            },
            ModuleFormRow {
                id: Some(kept.id),
                title: "Kept".to_string(),
                description: String::new(),
                delete: false,
            },
        ];
        modules::apply_formset(&db, media.path(), owner, id, &rows).unwrap();

        assert_eq!(count(&db, "file_items"), 1);
        assert!(!media.path().join("files/doomed.pdf").exists());
        assert!(media.path().join("files/kept.pdf").exists());
    }

    #[test]
    fn test_oversized_reorder_does_not_block_new_modules() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Rust");
        let first = modules::create_module(&db, id, "First", "", None).unwrap();

        let mut orders = BTreeMap::new();
        orders.insert(first.id, u32::MAX);
        let err = modules::reorder_modules(&db, owner, &orders).unwrap_err();
        assert!(matches!(service_error(&err), Some(ServiceError::Validation(_))));
        assert_eq!(modules::get_module(&db, first.id).unwrap().unwrap().order, 0);

        let second = modules::create_module(&db, id, "Second", "", None).unwrap();
        assert_eq!(second.order, 1);
    }

    #[test]
    fn test_formset_errors_are_keyed_by_row() {
        let db = create_test_db();
        let alice = instructor(&db, "alice@example.com");
        let bob = instructor(&db, "bob@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let alices = course(&db, alice, s, "Rust");
        let bobs = course(&db, bob, s, "Go");
        let foreign = modules::create_module(&db, bobs, "Foreign", "", None).unwrap();

        let rows = vec![
            ModuleFormRow {
                id: None,
                title: String::new(),
                description: "Has text but no title".to_string(),
                delete: false,
            },
            ModuleFormRow {
                id: Some(foreign.id),
                title: "Steal".to_string(),
                description: String::new(),
                delete: false,
            },
        ];
        let media = tempfile::tempdir().unwrap();
        let err = modules::apply_formset(&db, media.path(), alice, alices, &rows).unwrap_err();
        assert_eq!(field_error_keys(&err), vec!["form-0-title", "form-1-id"]);
        assert!(modules::list_modules(&db, alices).unwrap().is_empty());

        let err = modules::apply_formset(&db, media.path(), bob, alices, &[]).unwrap_err();
        assert!(matches!(service_error(&err), Some(ServiceError::NotFound(_))));
    }
}

mod content_integration_tests {
    use super::*;

    struct Fixture {
        db: Database,
        owner: i64,
        module_a: i64,
        module_b: i64,
    }

    fn fixture() -> Fixture {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Rust");
        let module_a = modules::create_module(&db, id, "A", "", None).unwrap().id;
        let module_b = modules::create_module(&db, id, "B", "", None).unwrap().id;
        Fixture {
            db,
            owner,
            module_a,
            module_b,
        }
    }

    #[test]
    fn test_content_orders_are_per_module() {
        let f = fixture();
        let c0 = contents::create_item_content(&f.db, f.owner, f.module_a, &text_item("One", "1")).unwrap();
        let c1 = contents::create_item_content(&f.db, f.owner, f.module_a, &text_item("Two", "2")).unwrap();
        let other = contents::create_item_content(&f.db, f.owner, f.module_b, &text_item("Other", "x")).unwrap();
        assert_eq!(
            (c0.content.order, c1.content.order, other.content.order),
            (0, 1, 0)
        );

        let listed = contents::list_module_contents(&f.db, f.module_a).unwrap();
        let titles: Vec<&str> = listed.iter().map(|c| c.item.title.as_str()).collect();
        assert_eq!(titles, ["One", "Two"]);
        assert_eq!(listed[0].item.kind(), ItemKind::Text);
    }

    #[test]
    fn test_add_existing_item_to_another_module() {
        let f = fixture();
        let created = contents::create_item_content(&f.db, f.owner, f.module_a, &text_item("Shared", "x")).unwrap();
        let placed = contents::add_content(&f.db, f.module_b, ItemKind::Text, created.item.id, Some(4)).unwrap();
        assert_eq!(placed.order, 4);
        assert_eq!(placed.item_kind, ItemKind::Text);

        let missing = contents::add_content(&f.db, f.module_b, ItemKind::Video, 999, None).unwrap_err();
        assert!(matches!(service_error(&missing), Some(ServiceError::NotFound(_))));
    }

    #[test]
    fn test_item_validation() {
        let f = fixture();
        let untitled = contents::create_item_content(&f.db, f.owner, f.module_a, &text_item("  ", "x")).unwrap_err();
        assert_eq!(field_error_keys(&untitled), vec!["title"]);

        let bad_video = NewItem {
            title: "Talk".to_string(),
            body: ItemBody::new(ItemKind::Video, "not a url".to_string()),
        };
        assert!(contents::create_item_content(&f.db, f.owner, f.module_a, &bad_video).is_err());
        assert_eq!(count(&f.db, "contents"), 0);
        assert_eq!(count(&f.db, "video_items"), 0);

        let accented = "é".repeat(250);
        assert!(contents::create_item_content(&f.db, f.owner, f.module_a, &text_item(&accented, "x")).is_ok());
        let too_long = "é".repeat(251);
        let err = contents::create_item_content(&f.db, f.owner, f.module_a, &text_item(&too_long, "x")).unwrap_err();
        assert_eq!(field_error_keys(&err), vec!["title"]);
    }

    #[test]
    fn test_delete_content_removes_item() {
        let f = fixture();
        let created = contents::create_item_content(&f.db, f.owner, f.module_a, &text_item("Gone", "x")).unwrap();
        let media = tempfile::tempdir().unwrap();

        let removed = contents::delete_content(&f.db, media.path(), f.owner, created.content.id).unwrap();
        assert_eq!(removed.module_id, f.module_a);
        assert!(contents::get_item(&f.db, ItemKind::Text, created.item.id).unwrap().is_none());
        assert_eq!(count(&f.db, "contents"), 0);
    }

    #[test]
    fn test_delete_content_removes_uploaded_file() {
        let f = fixture();
        let media = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(media.path().join("files")).unwrap();
        std::fs::write(media.path().join("files/notes.pdf"), b"%PDF-1.4").unwrap();

        let item = NewItem {
            title: "Notes".to_string(),
            body: ItemBody::new(ItemKind::File, "files/notes.pdf".to_string()),
        };
        let created = contents::create_item_content(&f.db, f.owner, f.module_a, &item).unwrap();
        contents::delete_content(&f.db, media.path(), f.owner, created.content.id).unwrap();
        assert!(!media.path().join("files/notes.pdf").exists());
    }

    #[test]
    fn test_contents_are_scoped_to_course_owner() {
        let f = fixture();
        let intruder = instructor(&f.db, "intruder@example.com");
        let created = contents::create_item_content(&f.db, f.owner, f.module_a, &text_item("Mine", "x")).unwrap();
        let media = tempfile::tempdir().unwrap();

        assert!(contents::get_owned_content(&f.db, intruder, created.content.id).is_err());
        assert!(contents::delete_content(&f.db, media.path(), intruder, created.content.id).is_err());
        assert!(contents::get_owned_item(&f.db, intruder, ItemKind::Text, created.item.id).is_err());

        let mut orders = BTreeMap::new();
        orders.insert(created.content.id, 3);
        assert_eq!(contents::reorder_contents(&f.db, intruder, &orders).unwrap(), 0);
        assert_eq!(contents::reorder_contents(&f.db, f.owner, &orders).unwrap(), 1);
    }

    #[test]
    fn test_update_owned_item() {
        let f = fixture();
        let created = contents::create_item_content(&f.db, f.owner, f.module_a, &text_item("Draft", "old")).unwrap();

        let update = ItemUpdate {
            title: "Final".to_string(),
            payload: Some("new body".to_string()),
        };
        let (item, replaced) = contents::update_owned_item(&f.db, f.owner, ItemKind::Text, created.item.id, &update).unwrap();
        assert_eq!(item.title, "Final");
        assert_eq!(item.body.payload(), "new body");
        assert!(replaced.is_none());

        let retitle = ItemUpdate {
            title: "Retitled".to_string(),
            payload: None,
        };
        let (item, _) = contents::update_owned_item(&f.db, f.owner, ItemKind::Text, created.item.id, &retitle).unwrap();
        assert_eq!(item.body.payload(), "new body");
    }

    #[test]
    fn test_unknown_item_kind_is_rejected() {
        let f = fixture();
        let conn = f.db.get().unwrap();
        let result = conn.execute(
            "INSERT INTO contents (module_id, item_kind, item_id, sort_order) VALUES (?, 'quiz', 1, 0)",
            [f.module_a],
        );
        assert!(result.is_err());
        assert!("quiz".parse::<ItemKind>().is_err());
    }
}

mod enrollment_integration_tests {
    use super::*;

    #[test]
    fn test_enroll_is_idempotent() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let learner = student(&db, "learn@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let id = course(&db, owner, s, "Rust");

        assert!(!enrollment::is_enrolled(&db, learner, id).unwrap());
        assert!(enrollment::enroll(&db, learner, id).unwrap());
        assert!(!enrollment::enroll(&db, learner, id).unwrap());
        assert!(enrollment::is_enrolled(&db, learner, id).unwrap());
        assert_eq!(enrollment::count_students(&db, id).unwrap(), 1);

        let enrolled = enrollment::list_enrolled_courses(&db, learner).unwrap();
        assert_eq!(enrolled.len(), 1);
        assert_eq!(enrolled[0].course.id, id);
    }

    #[test]
    fn test_enrolled_courses_only_lists_own_enrollments() {
        let db = create_test_db();
        let owner = instructor(&db, "teach@example.com");
        let ada = student(&db, "ada@example.com");
        let bob = student(&db, "bob@example.com");
        let s = series::create_series(&db, "Programming", None).unwrap();
        let rust = course(&db, owner, s, "Rust");
        let go = course(&db, owner, s, "Go");
        course(&db, owner, s, "Zig");
        modules::create_module(&db, rust, "Intro", "", None).unwrap();

        enrollment::enroll(&db, ada, rust).unwrap();
        enrollment::enroll(&db, ada, go).unwrap();
        enrollment::enroll(&db, bob, go).unwrap();

        let mut ids: Vec<i64> = enrollment::list_enrolled_courses(&db, ada)
            .unwrap()
            .iter()
            .map(|summary| summary.course.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![rust, go]);

        let bobs = enrollment::list_enrolled_courses(&db, bob).unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].course.id, go);
        assert_eq!(bobs[0].series_title, "Programming");

        let rust_summary = enrollment::list_enrolled_courses(&db, ada)
            .unwrap()
            .into_iter()
            .find(|summary| summary.course.id == rust)
            .unwrap();
        assert_eq!(rust_summary.total_modules, 1);
    }

    #[test]
    fn test_enroll_in_missing_course() {
        let db = create_test_db();
        let learner = student(&db, "learn@example.com");
        let err = enrollment::enroll(&db, learner, 404).unwrap_err();
        assert!(matches!(service_error(&err), Some(ServiceError::NotFound(_))));
    }
}

mod http_tests {
    use super::*;
    use academy::web::{router, AppState};
    use academy::Config;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct App {
        router: Router,
        db: Database,
        _media: tempfile::TempDir,
    }

    fn app() -> App {
        let media = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
[site]
title = "Test Academy"
url = "http://localhost:8000"

[database]
path = "unused.db"

[media]
upload_dir = "{}"
"#,
            media.path().display().to_string().replace('\\', "/")
        );
        let config = Config::parse(&toml).unwrap();
        let db = create_test_db();
        let state = Arc::new(AppState::new(config, db.clone()).unwrap());
        App {
            router: router(state),
            db,
            _media: media,
        }
    }

    async fn send(app: &App, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8_lossy(&bytes).into_owned())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn with_session(db: &Database, user_id: i64, builder: axum::http::request::Builder) -> axum::http::request::Builder {
        let token = auth::create_session(db, user_id, 1).unwrap();
        builder.header(header::COOKIE, format!("session={}", token))
    }

    fn seeded(app: &App) -> (i64, i64) {
        let owner = instructor(&app.db, "teach@example.com");
        let s = series::create_series(&app.db, "Programming", None).unwrap();
        let id = course(&app.db, owner, s, "Rust Basics");
        let module = modules::create_module(&app.db, id, "Ownership", "Moves and borrows", None).unwrap();
        contents::create_item_content(&app.db, owner, module.id, &text_item("Intro", "**Welcome**")).unwrap();
        (owner, id)
    }

    #[tokio::test]
    async fn test_root_redirects_to_catalog() {
        let app = app();
        let (status, headers, _) = send(&app, get("/")).await;
        assert!(status.is_redirection());
        assert_eq!(headers[header::LOCATION], "/courses");
    }

    #[tokio::test]
    async fn test_catalog_pages() {
        let app = app();
        seeded(&app);

        let (status, headers, body) = send(&app, get("/courses")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Rust Basics"));
        assert!(headers.contains_key("x-content-type-options"));

        let (status, _, body) = send(&app, get("/courses/series/programming")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Rust Basics"));

        let (status, _, body) = send(&app, get("/courses/course/rust-basics")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Ownership"));

        let (status, _, _) = send(&app, get("/courses/series/unknown")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&app, get("/courses/course/unknown")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manage_requires_login() {
        let app = app();
        let (status, headers, _) = send(&app, get("/courses/manage")).await;
        assert!(status.is_redirection());
        let location = headers[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/accounts/login?next="));
    }

    #[tokio::test]
    async fn test_manage_forbidden_for_students() {
        let app = app();
        let learner = student(&app.db, "learn@example.com");
        let request = with_session(&app.db, learner, Request::builder().uri("/courses/manage"))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_manage_pages_for_owner() {
        let app = app();
        let (owner, id) = seeded(&app);
        let other = instructor(&app.db, "other@example.com");

        let request = with_session(&app.db, owner, Request::builder().uri("/courses/manage"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Rust Basics"));

        let uri = format!("/courses/manage/{}/modules", id);
        let request = with_session(&app.db, owner, Request::builder().uri(&uri))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("form-TOTAL_FORMS"));

        let request = with_session(&app.db, other, Request::builder().uri(&uri))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_module_order_endpoint() {
        let app = app();
        let (owner, id) = seeded(&app);
        let second = modules::create_module(&app.db, id, "Traits", "", None).unwrap();
        let first = modules::list_modules(&app.db, id).unwrap()[0].clone();

        let body = format!(r#"{{"{}": 1, "{}": 0}}"#, first.id, second.id);
        let request = with_session(
            &app.db,
            owner,
            Request::builder()
                .method("POST")
                .uri("/courses/manage/module/order")
                .header(header::CONTENT_TYPE, "application/json"),
        )
        .body(Body::from(body))
        .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"saved":"OK"}"#);
        assert_eq!(modules::list_modules(&app.db, id).unwrap()[0].title, "Traits");
    }

    #[tokio::test]
    async fn test_student_enrollment_flow() {
        let app = app();
        let (_, id) = seeded(&app);
        let learner = student(&app.db, "learn@example.com");

        let detail = format!("/students/course/{}", id);
        let request = with_session(&app.db, learner, Request::builder().uri(&detail))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = with_session(
            &app.db,
            learner,
            Request::builder()
                .method("POST")
                .uri("/students/enroll-course")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
        )
        .body(Body::from(format!("course_id={}", id)))
        .unwrap();
        let (status, headers, _) = send(&app, request).await;
        assert!(status.is_redirection());
        assert_eq!(headers[header::LOCATION], detail.as_str());

        let request = with_session(&app.db, learner, Request::builder().uri(&detail))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<strong>Welcome</strong>"));
    }

    #[tokio::test]
    async fn test_signup_form_errors() {
        let app = app();
        student(&app.db, "taken@example.com");
        let request = Request::builder()
            .method("POST")
            .uri("/accounts/signup")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "email=taken%40example.com&name=Someone&password1=Password123&password2=Password123&type=student",
            ))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains(auth::DUPLICATE_EMAIL));
    }

    #[tokio::test]
    async fn test_api_catalog() {
        let app = app();
        let (_, id) = seeded(&app);

        let (status, _, body) = send(&app, get("/api/v1/courses")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["meta"]["total"], 1);
        assert_eq!(json["data"][0]["title"], "Rust Basics");
        assert_eq!(json["data"][0]["modules"][0]["order"], 0);

        let (status, _, body) = send(&app, get(&format!("/api/v1/courses/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["slug"], "rust-basics");

        let (status, _, body) = send(&app, get("/api/v1/series")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["data"][0]["slug"], "programming");

        let (status, _, _) = send(&app, get("/api/v1/courses/999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_auth_and_contents() {
        let app = app();
        let (_, id) = seeded(&app);

        let (status, headers, _) = send(&app, get(&format!("/api/v1/courses/{}/contents", id))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers.contains_key(header::WWW_AUTHENTICATE));

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/registration")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"email":"api@example.com","name":"Api","password1":"Password123","password2":"Password123"}"#,
            ))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let key = json["key"].as_str().unwrap().to_string();
        let authorization = format!("Token {}", key);

        let request = Request::builder()
            .uri("/api/v1/auth/user")
            .header(header::AUTHORIZATION, &authorization)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("api@example.com"));

        let contents_uri = format!("/api/v1/courses/{}/contents", id);
        let request = Request::builder()
            .uri(&contents_uri)
            .header(header::AUTHORIZATION, &authorization)
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/courses/{}/enroll", id))
            .header(header::AUTHORIZATION, &authorization)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"enrolled":true}"#);

        let request = Request::builder()
            .uri(&contents_uri)
            .header(header::AUTHORIZATION, &authorization)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["modules"][0]["contents"][0]["item"]["kind"], "text");
        assert!(json["modules"][0]["contents"][0]["item"]["html"]
            .as_str()
            .unwrap()
            .contains("<strong>Welcome</strong>"));

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .header(header::AUTHORIZATION, &authorization)
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::builder()
            .uri("/api/v1/auth/user")
            .header(header::AUTHORIZATION, &authorization)
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_api_registration_errors() {
        let app = app();
        student(&app.db, "taken@example.com");
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/registration")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"email":"taken@example.com","name":"X","password1":"Password123","password2":"Password123"}"#,
            ))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["fields"]["email"][0], auth::DUPLICATE_EMAIL);
    }

    #[tokio::test]
    async fn test_api_login() {
        let app = app();
        student(&app.db, "learn@example.com");

        let login = |password: &str| {
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(format!(
                    r#"{{"email":"learn@example.com","password":"{}"}}"#,
                    password
                )))
                .unwrap()
        };

        let (status, _, body) = send(&app, login(WRONG_PASSWORD)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("non_field_errors"));

        let (status, _, body) = send(&app, login(TEST_PASSWORD)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"key\":\"ak_"));
    }

    #[tokio::test]
    async fn test_admin_requires_staff() {
        let app = app();
        let teacher = instructor(&app.db, "teach@example.com");
        let request = with_session(&app.db, teacher, Request::builder().uri("/admin"))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = auth::create_superuser(&app.db, "root@example.com", "Root", TEST_PASSWORD).unwrap();
        let request = with_session(&app.db, admin, Request::builder().uri("/admin?type=instructor"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("teach@example.com"));
    }
}
