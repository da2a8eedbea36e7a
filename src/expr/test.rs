use crate::{
    ast::{ComparisonOp::*, Expression},
    options::TranslateOptions,
    result::Error,
    types::FieldType,
};
use bson::{doc, Bson};

macro_rules! test_compile {
    ($name:ident, expected = $expected:expr, input = $input:expr,) => {
        test_compile!(
            $name,
            expected = $expected,
            input = $input,
            aggregation = false,
            options = TranslateOptions::default(),
        );
    };
    ($name:ident, expected = $expected:expr, input = $input:expr, aggregation = $agg:expr,) => {
        test_compile!(
            $name,
            expected = $expected,
            input = $input,
            aggregation = $agg,
            options = TranslateOptions::default(),
        );
    };
    (
        $name:ident,
        expected = $expected:expr,
        input = $input:expr,
        aggregation = $agg:expr,
        options = $options:expr,
    ) => {
        #[test]
        fn $name() {
            let options = $options;
            let compiler = crate::expr::ExprCompiler::new(&options, $agg);
            assert_eq!($expected, compiler.compile(&$input));
        }
    };
}

macro_rules! test_compile_err {
    ($name:ident, $pattern:pat, input = $input:expr,) => {
        #[test]
        fn $name() {
            let options = TranslateOptions::default();
            let compiler = crate::expr::ExprCompiler::new(&options, false);
            assert!(matches!(compiler.compile(&$input), Err($pattern)));
        }
    };
}

mod comparison {
    use super::*;

    test_compile!(
        untyped_equality_has_no_operator_wrapper,
        expected = Ok(doc! {"value": 1_i64}),
        input = Expression::compare(Eq, Expression::column("value"), Expression::long(1)),
    );
    test_compile!(
        greater_than,
        expected = Ok(doc! {"value": {"$gt": 1_i64}}),
        input = Expression::compare(Gt, Expression::column("value"), Expression::long(1)),
    );
    test_compile!(
        literal_on_left_mirrors_operator,
        expected = Ok(doc! {"value": {"$lt": 1_i64}}),
        input = Expression::compare(Gt, Expression::long(1), Expression::column("value")),
    );
    test_compile!(
        column_to_column_plain,
        expected = Ok(doc! {"a": "b"}),
        input = Expression::compare(Eq, Expression::column("a"), Expression::column("b")),
    );
    test_compile!(
        column_to_column_aggregation,
        expected = Ok(doc! {"$expr": {"$eq": ["$a", "$b"]}}),
        input = Expression::compare(Eq, Expression::column("a"), Expression::column("b")),
        aggregation = true,
    );
    test_compile!(
        typed_column_coerces_literal,
        expected = Ok(doc! {"age": 25_i64}),
        input = Expression::compare(Eq, Expression::column("age"), Expression::string("25")),
        aggregation = false,
        options = TranslateOptions::new().with_field_type("age", FieldType::Number),
    );
    test_compile!(
        function_side_compiles_to_operand_array,
        expected = Ok(doc! {"$eq": [{"$toUpper": "$name"}, "SMITH"]}),
        input = Expression::compare(
            Eq,
            Expression::function("upper", vec![Expression::column("name")]),
            Expression::string("SMITH"),
        ),
    );
    test_compile!(
        function_side_wraps_in_expr_in_aggregation,
        expected = Ok(doc! {"$expr": {"$eq": [{"$toUpper": "$name"}, "SMITH"]}}),
        input = Expression::compare(
            Eq,
            Expression::function("upper", vec![Expression::column("name")]),
            Expression::string("SMITH"),
        ),
        aggregation = true,
    );
    test_compile_err!(
        literal_to_literal_rejected,
        Error::UnsupportedConstruct(_),
        input = Expression::compare(Eq, Expression::long(1), Expression::long(2)),
    );
}

mod logical {
    use super::*;

    test_compile!(
        and_chain_flattens,
        expected = Ok(doc! {"$and": [
            {"a": 1_i64},
            {"b": 2_i64},
            {"c": 3_i64},
        ]}),
        input = Expression::and(
            Expression::and(
                Expression::compare(Eq, Expression::column("a"), Expression::long(1)),
                Expression::compare(Eq, Expression::column("b"), Expression::long(2)),
            ),
            Expression::compare(Eq, Expression::column("c"), Expression::long(3)),
        ),
    );
    test_compile!(
        or_chain_flattens,
        expected = Ok(doc! {"$or": [
            {"a": 1_i64},
            {"b": 2_i64},
            {"c": 3_i64},
            {"d": 4_i64},
        ]}),
        input = Expression::or(
            Expression::or(
                Expression::or(
                    Expression::compare(Eq, Expression::column("a"), Expression::long(1)),
                    Expression::compare(Eq, Expression::column("b"), Expression::long(2)),
                ),
                Expression::compare(Eq, Expression::column("c"), Expression::long(3)),
            ),
            Expression::compare(Eq, Expression::column("d"), Expression::long(4)),
        ),
    );
    test_compile!(
        mixed_operators_nest_at_the_switch,
        expected = Ok(doc! {"$or": [
            {"$and": [{"a": 1_i64}, {"b": 2_i64}]},
            {"c": 3_i64},
        ]}),
        input = Expression::or(
            Expression::and(
                Expression::compare(Eq, Expression::column("a"), Expression::long(1)),
                Expression::compare(Eq, Expression::column("b"), Expression::long(2)),
            ),
            Expression::compare(Eq, Expression::column("c"), Expression::long(3)),
        ),
    );
    test_compile!(
        parentheses_break_the_spine,
        expected = Ok(doc! {"$and": [
            {"a": 1_i64},
            {"$and": [{"b": 2_i64}, {"c": 3_i64}]},
        ]}),
        input = Expression::and(
            Expression::compare(Eq, Expression::column("a"), Expression::long(1)),
            Expression::paren(Expression::and(
                Expression::compare(Eq, Expression::column("b"), Expression::long(2)),
                Expression::compare(Eq, Expression::column("c"), Expression::long(3)),
            )),
        ),
    );
}

mod not {
    use super::*;

    test_compile!(
        parenthesized_becomes_nor,
        expected = Ok(doc! {"$nor": [{"a": 1_i64}]}),
        input = Expression::Not(Box::new(Expression::paren(Expression::compare(
            Eq,
            Expression::column("a"),
            Expression::long(1),
        )))),
    );
    test_compile!(
        bare_column_negates_boolean,
        expected = Ok(doc! {"active": {"$ne": true}}),
        input = Expression::Not(Box::new(Expression::column("active"))),
    );
    test_compile!(
        comparison_wraps_value_side,
        expected = Ok(doc! {"a": {"$not": {"$gt": 5_i64}}}),
        input = Expression::Not(Box::new(Expression::compare(
            Gt,
            Expression::column("a"),
            Expression::long(5),
        ))),
    );
    test_compile!(
        equality_wraps_bare_value,
        expected = Ok(doc! {"a": {"$not": 5_i64}}),
        input = Expression::Not(Box::new(Expression::compare(
            Eq,
            Expression::column("a"),
            Expression::long(5),
        ))),
    );
}

mod null_checks {
    use super::*;

    test_compile!(
        is_null,
        expected = Ok(doc! {"a": {"$exists": false}}),
        input = Expression::IsNull {
            expr: Box::new(Expression::column("a")),
            negated: false,
        },
    );
    test_compile!(
        is_not_null,
        expected = Ok(doc! {"a": {"$exists": true}}),
        input = Expression::IsNull {
            expr: Box::new(Expression::column("a")),
            negated: true,
        },
    );
}

mod like {
    use super::*;

    test_compile!(
        leading_wildcard,
        expected = Ok(doc! {"address": {"$regex": "^.*Street$"}}),
        input = Expression::Like {
            left: Box::new(Expression::column("address")),
            right: Box::new(Expression::string("%Street")),
            negated: false,
        },
    );
    test_compile!(
        single_character_and_range_wildcards,
        expected = Ok(doc! {"code": {"$regex": "^A.[0-9]{1}.*$"}}),
        input = Expression::Like {
            left: Box::new(Expression::column("code")),
            right: Box::new(Expression::string("A_[0-9]%")),
            negated: false,
        },
    );
    test_compile!(
        negated_wraps_pattern_in_not,
        expected = Ok(doc! {"address": {"$not": Bson::RegularExpression(bson::Regex {
            pattern: "^.*Street$".to_string(),
            options: String::new(),
        })}}),
        input = Expression::Like {
            left: Box::new(Expression::column("address")),
            right: Box::new(Expression::string("%Street")),
            negated: true,
        },
    );
    test_compile_err!(
        non_column_left_side_rejected,
        Error::UnsupportedConstruct(_),
        input = Expression::Like {
            left: Box::new(Expression::long(1)),
            right: Box::new(Expression::string("%x")),
            negated: false,
        },
    );
}

mod in_list {
    use super::*;

    test_compile!(
        column_in_literals,
        expected = Ok(doc! {"borough": {"$in": ["Queens", "Manhattan"]}}),
        input = Expression::In {
            left: Box::new(Expression::column("borough")),
            items: vec![
                Expression::string("Queens"),
                Expression::string("Manhattan"),
            ],
            negated: false,
        },
    );
    test_compile!(
        negated_uses_nin,
        expected = Ok(doc! {"borough": {"$nin": ["Queens"]}}),
        input = Expression::In {
            left: Box::new(Expression::column("borough")),
            items: vec![Expression::string("Queens")],
            negated: true,
        },
    );
    test_compile!(
        aggregation_mode_wraps_in_expr,
        expected = Ok(doc! {"$expr": {"$in": ["$borough", ["Queens"]]}}),
        input = Expression::In {
            left: Box::new(Expression::column("borough")),
            items: vec![Expression::string("Queens")],
            negated: false,
        },
        aggregation = true,
    );
    test_compile!(
        typed_column_coerces_each_element,
        expected = Ok(doc! {"age": {"$in": [21_i64, 22_i64]}}),
        input = Expression::In {
            left: Box::new(Expression::column("age")),
            items: vec![Expression::string("21"), Expression::string("22")],
            negated: false,
        },
        aggregation = false,
        options = TranslateOptions::new().with_field_type("age", FieldType::Number),
    );
    test_compile!(
        function_left_side_emits_marker,
        expected = Ok(doc! {"$fin": {
            "function": {"$toUpper": "$name"},
            "list": ["SMITH", "JONES"],
        }}),
        input = Expression::In {
            left: Box::new(Expression::function(
                "upper",
                vec![Expression::column("name")],
            )),
            items: vec![Expression::string("SMITH"), Expression::string("JONES")],
            negated: false,
        },
    );
    test_compile!(
        negated_function_left_side_emits_fnin,
        expected = Ok(doc! {"$fnin": {
            "function": {"$toUpper": "$name"},
            "list": ["SMITH"],
        }}),
        input = Expression::In {
            left: Box::new(Expression::function(
                "upper",
                vec![Expression::column("name")],
            )),
            items: vec![Expression::string("SMITH")],
            negated: true,
        },
    );
}

mod special_values {
    use super::*;

    test_compile!(
        regex_match,
        expected = Ok(doc! {"zip": {"$regex": "^[0-9]{5}$"}}),
        input = Expression::function(
            "regexMatch",
            vec![Expression::column("zip"), Expression::string("^[0-9]{5}$")],
        ),
    );
    test_compile!(
        regex_match_with_options,
        expected = Ok(doc! {"name": {"$regex": "smith", "$options": "i"}}),
        input = Expression::function(
            "regexMatch",
            vec![
                Expression::column("name"),
                Expression::string("smith"),
                Expression::string("i"),
            ],
        ),
    );
    test_compile!(
        negated_regex_match,
        expected = Ok(doc! {"name": {"$not": Bson::RegularExpression(bson::Regex {
            pattern: "smith".to_string(),
            options: String::new(),
        })}}),
        input = Expression::function(
            "notRegexMatch",
            vec![Expression::column("name"), Expression::string("smith")],
        ),
    );
    test_compile!(
        date_comparison,
        expected = Ok(doc! {"created": {"$gte": Bson::DateTime(bson::DateTime::from_chrono(
            chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2016, 5, 25, 0, 0, 0).unwrap()
        ))}}),
        input = Expression::compare(
            Gte,
            Expression::function(
                "date",
                vec![
                    Expression::column("created"),
                    Expression::string("yyyy-MM-dd"),
                ],
            ),
            Expression::string("2016-05-25"),
        ),
    );
    test_compile_err!(
        date_equality_rejected,
        Error::UnsupportedConstruct(_),
        input = Expression::compare(
            Eq,
            Expression::function(
                "date",
                vec![Expression::column("created"), Expression::string("natural")],
            ),
            Expression::string("May 25, 2016"),
        ),
    );

    #[test]
    fn object_id_equality_keys_on_the_wrapped_column() {
        let options = TranslateOptions::default();
        let compiler = crate::expr::ExprCompiler::new(&options, false);
        let oid = bson::oid::ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let input = Expression::compare(
            Eq,
            Expression::function("objectid", vec![Expression::string("_id")]),
            Expression::string("507f1f77bcf86cd799439011"),
        );
        assert_eq!(Ok(doc! {"_id": oid}), compiler.compile(&input));
    }

    #[test]
    fn object_id_call_may_sit_on_the_right() {
        let options = TranslateOptions::default();
        let compiler = crate::expr::ExprCompiler::new(&options, false);
        let oid = bson::oid::ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let input = Expression::compare(
            Eq,
            Expression::string("507f1f77bcf86cd799439011"),
            Expression::function("objectid", vec![Expression::column("_id")]),
        );
        assert_eq!(Ok(doc! {"_id": oid}), compiler.compile(&input));
    }

    #[test]
    fn object_id_inequality_wraps_in_ne() {
        let options = TranslateOptions::default();
        let compiler = crate::expr::ExprCompiler::new(&options, false);
        let oid = bson::oid::ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let input = Expression::compare(
            Ne,
            Expression::function("objectid", vec![Expression::string("_id")]),
            Expression::string("507f1f77bcf86cd799439011"),
        );
        assert_eq!(Ok(doc! {"_id": {"$ne": oid}}), compiler.compile(&input));
    }

    #[test]
    fn object_id_in_list_parses_every_element() {
        let options = TranslateOptions::default();
        let compiler = crate::expr::ExprCompiler::new(&options, false);
        let first = bson::oid::ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let second = bson::oid::ObjectId::parse_str("507f191e810c19729de860ea").unwrap();
        let input = Expression::In {
            left: Box::new(Expression::function(
                "objectid",
                vec![Expression::string("_id")],
            )),
            items: vec![
                Expression::string("507f1f77bcf86cd799439011"),
                Expression::string("507f191e810c19729de860ea"),
            ],
            negated: false,
        };
        assert_eq!(
            Ok(doc! {"_id": {"$in": [first, second]}}),
            compiler.compile(&input)
        );
    }

    #[test]
    fn negated_object_id_list_uses_nin() {
        let options = TranslateOptions::default();
        let compiler = crate::expr::ExprCompiler::new(&options, false);
        let first = bson::oid::ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let second = bson::oid::ObjectId::parse_str("507f191e810c19729de860ea").unwrap();
        let input = Expression::In {
            left: Box::new(Expression::function(
                "objectid",
                vec![Expression::column("_id")],
            )),
            items: vec![
                Expression::string("507f1f77bcf86cd799439011"),
                Expression::string("507f191e810c19729de860ea"),
            ],
            negated: true,
        };
        assert_eq!(
            Ok(doc! {"_id": {"$nin": [first, second]}}),
            compiler.compile(&input)
        );
    }

    test_compile_err!(
        object_id_range_comparison_rejected,
        Error::UnsupportedConstruct(_),
        input = Expression::compare(
            Gt,
            Expression::function("objectid", vec![Expression::string("_id")]),
            Expression::string("507f1f77bcf86cd799439011"),
        ),
    );
    test_compile_err!(
        object_id_with_invalid_hex_rejected,
        Error::InvalidLiteral(_),
        input = Expression::compare(
            Eq,
            Expression::function("objectid", vec![Expression::string("_id")]),
            Expression::string("nope"),
        ),
    );
    test_compile_err!(
        object_id_as_plain_value_rejected,
        Error::UnsupportedConstruct(_),
        input = Expression::In {
            left: Box::new(Expression::column("a")),
            items: vec![Expression::function(
                "objectid",
                vec![Expression::string("507f1f77bcf86cd799439011")],
            )],
            negated: false,
        },
    );
}

mod having {
    use super::*;
    use crate::pipeline::AliasHolder;

    #[test]
    fn alias_column_compiles_as_projected_field() {
        let options = TranslateOptions::default();
        let aliases = AliasHolder::new();
        let compiler = crate::expr::ExprCompiler::for_having(&options, &aliases);
        let input = Expression::compare(Gt, Expression::column("c"), Expression::long(500));
        assert_eq!(Ok(doc! {"c": {"$gt": 500_i64}}), compiler.compile(&input));
    }

    #[test]
    fn aggregate_resolves_to_select_alias() {
        let options = TranslateOptions::default();
        let mut aliases = AliasHolder::new();
        aliases
            .insert("count(b)".to_string(), "c".to_string())
            .unwrap();
        let compiler = crate::expr::ExprCompiler::for_having(&options, &aliases);
        let input = Expression::compare(
            Gt,
            Expression::function("count", vec![Expression::column("b")]),
            Expression::long(500),
        );
        assert_eq!(
            Ok(doc! {"$expr": {"$gt": ["$c", 500_i64]}}),
            compiler.compile(&input)
        );
    }

    #[test]
    fn unaliased_aggregate_synthesizes_its_name() {
        let options = TranslateOptions::default();
        let aliases = AliasHolder::new();
        let compiler = crate::expr::ExprCompiler::for_having(&options, &aliases);
        let input = Expression::compare(
            Gte,
            Expression::function("sum", vec![Expression::column("order.total")]),
            Expression::long(100),
        );
        assert_eq!(
            Ok(doc! {"$expr": {"$gte": ["$sum_order_total", 100_i64]}}),
            compiler.compile(&input)
        );
    }

    #[test]
    fn count_synthesizes_bare_name() {
        let options = TranslateOptions::default();
        let aliases = AliasHolder::new();
        let compiler = crate::expr::ExprCompiler::for_having(&options, &aliases);
        let input = Expression::compare(
            Gt,
            Expression::function("count", vec![Expression::column("*")]),
            Expression::long(5),
        );
        assert_eq!(
            Ok(doc! {"$expr": {"$gt": ["$count", 5_i64]}}),
            compiler.compile(&input)
        );
    }
}

mod functions {
    use super::*;

    test_compile!(
        known_alias_renames_operator,
        expected = Ok(doc! {"$eq": [{"$ifNull": ["$a", "fallback"]}, "fallback"]}),
        input = Expression::compare(
            Eq,
            Expression::function(
                "ifnull",
                vec![Expression::column("a"), Expression::string("fallback")],
            ),
            Expression::string("fallback"),
        ),
    );
    test_compile!(
        unknown_name_passes_through,
        expected = Ok(doc! {"$eq": [{"$strLenCP": "$name"}, 5_i64]}),
        input = Expression::compare(
            Eq,
            Expression::function("strLenCP", vec![Expression::column("name")]),
            Expression::long(5),
        ),
    );
}
