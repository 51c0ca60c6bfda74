//! Composer chain tests
//!
//! Builds composers against a recording backend and checks the flattened
//! statements, without executing anything.

mod common;

use common::{POST_SCHEMA, Post, User, mock_database, placeholder_numbers};
use proptest::prelude::*;
use quarry_db::composer::{ColumnRef, Composer, Pagination};
use quarry_db::prelude::*;
use rstest::*;

#[fixture]
fn posts() -> Composer<Post> {
	let (db, _) = mock_database(DatabaseType::Postgres);
	db.query::<Post>()
}

fn sqlite_posts() -> Composer<Post> {
	let (db, _) = mock_database(DatabaseType::Sqlite);
	db.query::<Post>()
}

// ============================================================================
// Chaining
// ============================================================================

#[rstest]
fn test_second_filter_wraps_first(posts: Composer<Post>) {
	let composer = posts
		.filter(FilterObject::new().with("views__gte", 10))
		.filter(FilterObject::new().with("title__startswith", "Rust"));

	assert_eq!(composer.stage_count(), 2);

	let prepared = composer.prepare();
	assert_eq!(
		prepared.sql,
		"SELECT \"t1\".\"id\" AS \"id\", \"t1\".\"user_id\" AS \"user_id\", \
		 \"t1\".\"title\" AS \"title\", \"t1\".\"views\" AS \"views\" FROM (\
		 SELECT \"posts\".\"id\" AS \"id\", \"posts\".\"user_id\" AS \"user_id\", \
		 \"posts\".\"title\" AS \"title\", \"posts\".\"views\" AS \"views\" FROM \"posts\" \
		 WHERE \"posts\".\"views\" >= $1) AS \"t1\" WHERE \"t1\".\"title\" LIKE $2 || '%'"
	);
	assert_eq!(prepared.params, vec![QueryValue::Int(10), QueryValue::from("Rust")]);
}

#[rstest]
fn test_filter_without_predicates_keeps_stage_open(posts: Composer<Post>) {
	let composer = posts
		.filter(FilterObject::new().with("__count", 5))
		.filter(FilterObject::new().with("views__gt", 1))
		.filter(FilterObject::new().with("bogus", 1));

	// The third call splits; its stage holds no predicates
	assert_eq!(composer.stage_count(), 2);
	assert!(!composer.current_stage().has_filters());
	assert_eq!(composer.stages()[0].pagination().count, 5);
}

#[rstest]
fn test_or_groups_share_one_stage(posts: Composer<Post>) {
	let composer = posts.filter([
		FilterObject::new().with("views__lt", 5),
		FilterObject::new().with("title", "intro"),
	]);

	assert_eq!(composer.stage_count(), 1);
	assert!(composer.to_sql().ends_with(
		"WHERE (\"posts\".\"views\" < $1) OR (\"posts\".\"title\" = $2)"
	));
}

#[rstest]
fn test_copy_branches_independently(posts: Composer<Post>) {
	let base = posts.filter(FilterObject::new().with("views__gt", 0));
	let branch = base.copy().filter(FilterObject::new().with("id", 3));

	assert_eq!(base.stage_count(), 1);
	assert_eq!(branch.stage_count(), 2);
	assert_ne!(base.to_sql(), branch.to_sql());
}

// ============================================================================
// Pagination
// ============================================================================

#[rstest]
#[case(&[(0, 5), (0, 3)], Pagination { count: 3, offset: 0 })]
#[case(&[(0, 5), (0, 10)], Pagination { count: 5, offset: 0 })]
#[case(&[(2, 5), (1, 3)], Pagination { count: 3, offset: 3 })]
#[case(&[(0, 5), (0, 0)], Pagination { count: 5, offset: 0 })]
fn test_limit_narrows(
	posts: Composer<Post>,
	#[case] calls: &[(u64, u64)],
	#[case] expected: Pagination,
) {
	let composer = calls
		.iter()
		.fold(posts, |composer, (offset, count)| composer.limit_offset(*offset, *count));

	assert_eq!(composer.current_stage().pagination(), expected);
}

#[rstest]
fn test_filter_object_pagination_keys(posts: Composer<Post>) {
	let sql = posts
		.filter(FilterObject::new().with("__offset", 20).with("__count", 10))
		.to_sql();

	assert!(sql.ends_with("FROM \"posts\" LIMIT 10 OFFSET 20"));
}

#[rstest]
fn test_offset_only_object_keeps_limit(posts: Composer<Post>) {
	let composer = posts
		.limit(1)
		.filter(FilterObject::new().with("__offset", 1));

	assert_eq!(
		composer.current_stage().pagination(),
		Pagination { count: 1, offset: 1 }
	);
	assert!(composer.to_sql().ends_with("FROM \"posts\" LIMIT 1 OFFSET 1"));
}

#[test]
fn test_sqlite_offset_without_count() {
	let sql = sqlite_posts().limit_offset(4, 0).to_sql();
	assert!(sql.ends_with("LIMIT -1 OFFSET 4"));
}

// ============================================================================
// Projection
// ============================================================================

#[rstest]
fn test_default_projection_is_native(posts: Composer<Post>) {
	let prepared = posts.prepare();

	let keys: Vec<&str> = prepared.columns.iter().map(|c| c.key()).collect();
	assert_eq!(keys, vec!["id", "user_id", "title", "views"]);
	assert!(prepared.return_models);
	assert!(!prepared.grouped);
}

#[rstest]
fn test_external_interface(posts: Composer<Post>) {
	let prepared = posts.external().prepare();

	assert_eq!(
		prepared.sql,
		"SELECT \"posts\".\"id\" AS \"id\", \"posts\".\"title\" AS \"title\" FROM \"posts\""
	);
	assert!(!prepared.return_models);
}

#[rstest]
fn test_interface_drops_unknown_names(posts: Composer<Post>) {
	let composer = posts.interface(["title", "nope", "views"]);
	let keys: Vec<String> = composer
		.prepare()
		.columns
		.iter()
		.map(|c| c.key().to_string())
		.collect();

	assert_eq!(keys, vec!["title", "views"]);
}

// ============================================================================
// Joins
// ============================================================================

#[rstest]
fn test_join_selects_every_related_column(posts: Composer<Post>) -> anyhow::Result<()> {
	let prepared = posts
		.join("user")?
		.interface(["id".into(), ColumnRequest::relationship("user", ["name"])])
		.prepare();

	assert_eq!(
		prepared.sql,
		"SELECT \"posts\".\"id\" AS \"id\", \"user\".\"name\" AS \"user$name\" FROM \"posts\" \
		 LEFT JOIN \"users\" AS \"user\" ON \"user\".\"id\" = \"posts\".\"user_id\""
	);
	Ok(())
}

#[rstest]
fn test_join_default_columns_are_aliased(posts: Composer<Post>) -> anyhow::Result<()> {
	let composer = posts.join("user")?.join("user")?;

	let aliases: Vec<&str> = composer
		.projection()
		.joined_columns
		.iter()
		.map(|c| c.alias.as_str())
		.collect();
	assert_eq!(aliases, vec!["user$id", "user$name", "user$karma"]);
	assert_eq!(composer.projection().joins.len(), 1);
	assert!(!composer.prepare().return_models);
	Ok(())
}

#[rstest]
fn test_join_errors(posts: Composer<Post>) {
	let error = posts.copy().join("author").unwrap_err();
	assert!(matches!(
		error,
		ComposerError::UnknownRelationship { ref relationship, .. } if relationship == "author"
	));

	let error = posts.join_columns("user", ["name", "age"]).unwrap_err();
	assert!(matches!(
		error,
		ComposerError::UnknownColumn { ref model, ref column } if model == "User" && column == "age"
	));
}

#[rstest]
fn test_related_filter_uses_join_when_present(posts: Composer<Post>) -> anyhow::Result<()> {
	let sql = posts
		.join_columns("user", ["name"])?
		.filter(FilterObject::new().with("user__name", "ada"))
		.to_sql();

	assert!(sql.ends_with("WHERE \"user\".\"name\" = $1"));
	Ok(())
}

#[rstest]
fn test_related_filter_without_join_uses_subquery(posts: Composer<Post>) {
	let sql = posts
		.filter(FilterObject::new().with("user__karma__gte", 50))
		.to_sql();

	assert!(sql.ends_with(
		"WHERE \"posts\".\"user_id\" IN (SELECT \"user\".\"id\" FROM \"users\" AS \"user\" \
		 WHERE \"user\".\"karma\" >= $1)"
	));
}

#[rstest]
fn test_model_instance_filter(posts: Composer<Post>) {
	let ada = User {
		id: 7,
		name: "Ada".to_string(),
		karma: 1,
	};
	let prepared = posts.filter(FilterObject::new().with_model("user", &ada)).prepare();

	assert!(prepared.sql.ends_with("WHERE \"posts\".\"user_id\" = $1"));
	assert_eq!(prepared.params, vec![QueryValue::Int(7)]);
}

// ============================================================================
// Ordering and grouping
// ============================================================================

#[rstest]
fn test_grouped_order_acquires_aggregate(posts: Composer<Post>) -> anyhow::Result<()> {
	// Order first, group second: the order entry is re-derived
	let composer = posts.order_by("views", Direction::Desc)?.group_by("user_id")?;

	let order = &composer.current_stage().order_by()[0];
	assert_eq!(order.aggregate(), Some(&AggregateExpr::Sum));

	let prepared = composer.interface(["user_id", "views"]).prepare();
	assert_eq!(
		prepared.sql,
		"SELECT \"posts\".\"user_id\" AS \"user_id\", SUM(\"posts\".\"views\") AS \"views\" \
		 FROM \"posts\" GROUP BY \"posts\".\"user_id\" ORDER BY SUM(\"posts\".\"views\") DESC"
	);
	assert!(prepared.grouped);
	assert!(!prepared.return_models);
	Ok(())
}

#[rstest]
fn test_group_key_orders_plainly(posts: Composer<Post>) -> anyhow::Result<()> {
	let composer = posts.group_by("user_id")?.order_by("user_id", Direction::Asc)?;

	assert_eq!(composer.current_stage().order_by()[0].aggregate(), None);
	assert!(composer.to_sql().ends_with("ORDER BY \"posts\".\"user_id\" ASC"));
	Ok(())
}

#[rstest]
fn test_explicit_order_format_wins(posts: Composer<Post>) -> anyhow::Result<()> {
	let sql = posts
		.group_by("user_id")?
		.order_by_format("views", Direction::Asc, |c| format!("AVG({})", c[0]))?
		.to_sql();

	assert!(sql.ends_with("ORDER BY AVG(\"posts\".\"views\") ASC"));
	Ok(())
}

#[rstest]
fn test_standalone_aggregate_rejects_order(posts: Composer<Post>) {
	let aggregate = posts.aggregate();

	assert!(aggregate.current_stage().is_standalone_aggregate());
	assert!(matches!(
		aggregate.order_by("views", Direction::Asc),
		Err(ComposerError::StandaloneAggregateOrder)
	));
}

#[rstest]
fn test_unknown_order_field(posts: Composer<Post>) {
	assert!(matches!(
		posts.copy().order_by("rating", Direction::Asc),
		Err(ComposerError::UnknownColumn { .. })
	));

	// Through a filter object the same mistake is ignored
	let composer = posts.filter(FilterObject::new().with("__order", "rating desc"));
	assert!(composer.current_stage().order_by().is_empty());
}

#[rstest]
fn test_group_by_relationship_groups_related_columns(posts: Composer<Post>) -> anyhow::Result<()> {
	let composer = posts.group_by("user")?;

	let keys: Vec<ColumnRef> = composer
		.current_stage()
		.group_by()
		.unwrap_or_default()
		.iter()
		.flat_map(|spec| spec.columns.clone())
		.collect();
	assert_eq!(keys.len(), 3);
	assert!(composer.projection().is_joined("user"));
	assert!(composer.to_sql().ends_with(
		"GROUP BY \"user\".\"id\", \"user\".\"name\", \"user\".\"karma\""
	));
	Ok(())
}

#[rstest]
fn test_group_by_format(posts: Composer<Post>) -> anyhow::Result<()> {
	let sql = posts
		.group_by_format(["title", "user_id"], |c| format!("{} || '-' || {}", c[0], c[1]))?
		.interface(["views"])
		.to_sql();

	assert_eq!(
		sql,
		"SELECT SUM(\"posts\".\"views\") AS \"views\" FROM \"posts\" \
		 GROUP BY \"posts\".\"title\" || '-' || \"posts\".\"user_id\""
	);
	Ok(())
}

#[rstest]
fn test_outer_stage_orders_by_related_column(posts: Composer<Post>) -> anyhow::Result<()> {
	let prepared = posts
		.filter(FilterObject::new().with("views__gte", 1))
		.filter(FilterObject::new().with("views__lt", 1000))
		.order_by("user__name", Direction::Asc)?
		.prepare();

	assert_eq!(
		prepared.sql,
		"SELECT \"t1\".\"id\" AS \"id\", \"t1\".\"user_id\" AS \"user_id\", \
		 \"t1\".\"title\" AS \"title\", \"t1\".\"views\" AS \"views\" FROM (\
		 SELECT \"posts\".\"id\" AS \"id\", \"posts\".\"user_id\" AS \"user_id\", \
		 \"posts\".\"title\" AS \"title\", \"posts\".\"views\" AS \"views\", \
		 \"user\".\"name\" AS \"user$name\" FROM \"posts\" \
		 LEFT JOIN \"users\" AS \"user\" ON \"user\".\"id\" = \"posts\".\"user_id\" \
		 WHERE \"posts\".\"views\" >= $1) AS \"t1\" \
		 WHERE \"t1\".\"views\" < $2 ORDER BY \"t1\".\"user$name\" ASC"
	);
	assert!(prepared.return_models);
	Ok(())
}

#[rstest]
fn test_outer_stage_groups_by_relationship(posts: Composer<Post>) -> anyhow::Result<()> {
	let sql = posts
		.filter(FilterObject::new().with("views__gte", 1))
		.filter(FilterObject::new().with("views__lt", 1000))
		.group_by("user")?
		.interface(["views"])
		.to_sql();

	assert!(sql.starts_with(
		"SELECT SUM(\"t1\".\"views\") AS \"views\" FROM (SELECT \"posts\".\"views\" AS \"views\", \
		 \"user\".\"id\" AS \"user$id\", \"user\".\"name\" AS \"user$name\", \
		 \"user\".\"karma\" AS \"user$karma\" FROM \"posts\" LEFT JOIN"
	));
	assert!(sql.ends_with(
		"GROUP BY \"t1\".\"user$id\", \"t1\".\"user$name\", \"t1\".\"user$karma\""
	));
	Ok(())
}

#[rstest]
fn test_outer_stage_filters_unprojected_column(posts: Composer<Post>) {
	let sql = posts
		.filter(FilterObject::new().with("views__gte", 1))
		.filter(FilterObject::new().with("id__gt", 3))
		.interface(["title"])
		.to_sql();

	assert_eq!(
		sql,
		"SELECT \"t1\".\"title\" AS \"title\" FROM (SELECT \"posts\".\"title\" AS \"title\", \
		 \"posts\".\"id\" AS \"id\" FROM \"posts\" WHERE \"posts\".\"views\" >= $1) AS \"t1\" \
		 WHERE \"t1\".\"id\" > $2"
	);
}

// ============================================================================
// Transformations
// ============================================================================

#[rstest]
fn test_transformation_rendered_in_projection(posts: Composer<Post>) -> anyhow::Result<()> {
	let composer = posts.transform(TransformSpec::sql("shout", ["title"], |c| {
		format!("UPPER({})", c[0])
	}))?;
	let sql = composer.interface(["id", "shout"]).to_sql();

	assert_eq!(
		sql,
		"SELECT \"posts\".\"id\" AS \"id\", UPPER(\"posts\".\"title\") AS \"shout\" FROM \"posts\""
	);
	Ok(())
}

#[rstest]
fn test_transformation_over_related_column_joins(posts: Composer<Post>) -> anyhow::Result<()> {
	let composer = posts.transform(
		TransformSpec::sql("author", ["user__name"], |c| format!("LOWER({})", c[0]))
			.result_type(ColumnType::Text),
	)?;

	assert!(composer.projection().is_joined("user"));
	let sql = composer.interface(["author"]).to_sql();
	assert_eq!(
		sql,
		"SELECT LOWER(\"user\".\"name\") AS \"author\" FROM \"posts\" \
		 LEFT JOIN \"users\" AS \"user\" ON \"user\".\"id\" = \"posts\".\"user_id\""
	);
	Ok(())
}

#[rstest]
fn test_stransform_collects_array_when_grouped(posts: Composer<Post>) -> anyhow::Result<()> {
	let prepared = posts
		.stransform(TransformSpec::sql("titles", ["title"], |c| c[0].clone()))?
		.group_by("user_id")?
		.interface(["user_id", "titles"])
		.prepare();

	assert_eq!(
		prepared.sql,
		"SELECT \"posts\".\"user_id\" AS \"user_id\", ARRAY_AGG(\"posts\".\"title\") AS \"titles\" \
		 FROM \"posts\" GROUP BY \"posts\".\"user_id\""
	);
	Ok(())
}

#[rstest]
fn test_aggregated_transformation_wraps_sources(posts: Composer<Post>) -> anyhow::Result<()> {
	let sql = posts
		.transform(
			TransformSpec::sql("per_post", ["views", "id"], |c| format!("{} / {}", c[0], c[1]))
				.aggregated(true),
		)?
		.group_by("user_id")?
		.interface(["per_post"])
		.to_sql();

	assert!(sql.starts_with("SELECT SUM(\"posts\".\"views\") / COUNT(\"posts\".\"id\") AS \"per_post\""));
	Ok(())
}

#[rstest]
fn test_post_fetch_transformation_selects_hidden_sources(posts: Composer<Post>) -> anyhow::Result<()> {
	let sql = posts
		.transform(TransformSpec::value("label", ["id", "title"], |values| {
			QueryValue::String(format!("{:?}", values))
		}))?
		.interface(["label"])
		.to_sql();

	assert_eq!(
		sql,
		"SELECT \"posts\".\"id\" AS \"__label__0\", \"posts\".\"title\" AS \"__label__1\" FROM \"posts\""
	);
	Ok(())
}

#[rstest]
#[case("", "alias is empty")]
#[case("title", "shadows")]
fn test_invalid_transform_alias(posts: Composer<Post>, #[case] alias: &str, #[case] reason: &str) {
	let error = posts
		.transform(TransformSpec::sql(alias, ["title"], |c| c[0].clone()))
		.unwrap_err();

	assert!(error.to_string().contains(reason), "{}", error);
}

#[rstest]
fn test_transform_unknown_sources(posts: Composer<Post>) {
	assert!(matches!(
		posts
			.copy()
			.transform(TransformSpec::sql("x", ["missing"], |c| c[0].clone())),
		Err(ComposerError::UnknownColumn { .. })
	));
	assert!(matches!(
		posts.transform(TransformSpec::sql("x", ["author__name"], |c| c[0].clone())),
		Err(ComposerError::UnknownRelationship { .. })
	));
}

#[rstest]
fn test_post_fetch_transformation_can_not_be_ordered(posts: Composer<Post>) -> anyhow::Result<()> {
	let composer = posts.transform(TransformSpec::value("label", ["title"], |v| v[0].clone()))?;

	assert!(matches!(
		composer.order_by("label", Direction::Asc),
		Err(ComposerError::InvalidTransform { .. })
	));
	Ok(())
}

// ============================================================================
// Summary
// ============================================================================

#[rstest]
fn test_summary_statement_collapses_outer_stage(posts: Composer<Post>) {
	let composer = posts
		.filter(FilterObject::new().with("views__gt", 1))
		.filter(FilterObject::new().with("title__contains", "db"))
		.limit(10);

	let summary = composer.prepare_summary();
	assert!(summary.sql.starts_with(
		"SELECT COUNT(\"t1\".\"id\") AS \"id\", NULL AS \"user_id\", NULL AS \"title\", \
		 SUM(\"t1\".\"views\") AS \"views\" FROM (SELECT"
	));
	assert!(!summary.sql.contains("LIMIT"));
	assert_eq!(summary.params, composer.prepare().params);
}

// ============================================================================
// Property-Based Tests: parameter alignment
// ============================================================================

const KEYS: [&str; 5] = ["views__gt", "id__not", "title__contains", "user_id__in", "views__lte"];

proptest! {
	/// Placeholders are numbered 1..=n across every nested stage and the
	/// parameter list has exactly n entries.
	#[test]
	fn prop_params_align_with_placeholders(
		levels in prop::collection::vec(prop::collection::vec(any::<i32>(), 1..=5), 1..5),
		sqlite in any::<bool>(),
	) {
		let database_type = if sqlite { DatabaseType::Sqlite } else { DatabaseType::Postgres };
		let (db, _) = mock_database(database_type);

		let composer = levels.iter().fold(db.query::<Post>(), |composer, values| {
			let object = KEYS.iter().zip(values).fold(FilterObject::new(), |object, (key, value)| {
				if key.ends_with("__in") {
					object.with(*key, vec![*value, value.wrapping_add(1)])
				} else {
					object.with(*key, *value)
				}
			});
			composer.filter(object)
		});
		let prepared = composer.prepare();

		prop_assert_eq!(composer.stage_count(), levels.len());
		let numbers = placeholder_numbers(&prepared.sql, database_type);
		let expected: Vec<usize> = (1..=prepared.params.len()).collect();
		prop_assert_eq!(numbers, expected);

		let bound: usize = levels
			.iter()
			.map(|values| values.len() + usize::from(values.len() >= 4))
			.sum();
		prop_assert_eq!(prepared.params.len(), bound);
	}

	/// Every stage's count only ever narrows and offsets add up
	#[test]
	fn prop_limit_is_monotonic(calls in prop::collection::vec((0u64..50, 0u64..100), 1..8)) {
		let (db, _) = mock_database(DatabaseType::Postgres);
		let composer = calls
			.iter()
			.fold(db.query::<Post>(), |c, (offset, count)| c.limit_offset(*offset, *count));

		let pagination = composer.current_stage().pagination();
		prop_assert_eq!(pagination.offset, calls.iter().map(|(o, _)| o).sum::<u64>());
		let narrowest = calls.iter().map(|(_, c)| *c).filter(|c| *c > 0).min().unwrap_or(0);
		prop_assert_eq!(pagination.count, narrowest);
	}
}

#[test]
fn test_post_schema_is_shared() {
	assert_eq!(POST_SCHEMA.relationship("user").map(|r| r.table()), Some("users"));
	assert!(std::sync::Arc::ptr_eq(&*POST_SCHEMA, &Post::schema()));
}
