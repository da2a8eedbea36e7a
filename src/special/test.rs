use crate::{
    ast::{ComparisonOp, Expression},
    result::Error,
    special::{
        date_function, object_id_comparison, object_id_in_list, regex_function, ObjectIdFunction,
        RegexFunction,
    },
};
use bson::oid::ObjectId;
use chrono::{TimeZone, Utc};

mod regex {
    use super::*;

    #[test]
    fn basic_match() {
        let input = Expression::function(
            "regexMatch",
            vec![Expression::column("zip"), Expression::string("^[0-9]{5}$")],
        );
        assert_eq!(
            Ok(Some(RegexFunction {
                column: "zip".to_string(),
                pattern: "^[0-9]{5}$".to_string(),
                options: None,
                negated: false,
            })),
            regex_function(&input)
        );
    }

    #[test]
    fn with_options() {
        let input = Expression::function(
            "regexMatch",
            vec![
                Expression::column("name"),
                Expression::string("smith"),
                Expression::string("i"),
            ],
        );
        assert_eq!(
            Ok(Some(RegexFunction {
                column: "name".to_string(),
                pattern: "smith".to_string(),
                options: Some("i".to_string()),
                negated: false,
            })),
            regex_function(&input)
        );
    }

    #[test]
    fn negated() {
        let input = Expression::function(
            "notRegexMatch",
            vec![Expression::column("name"), Expression::string("smith")],
        );
        let result = regex_function(&input).unwrap().unwrap();
        assert!(result.negated);
    }

    #[test]
    fn negated_with_options_rejected() {
        let input = Expression::function(
            "notRegexMatch",
            vec![
                Expression::column("name"),
                Expression::string("smith"),
                Expression::string("i"),
            ],
        );
        assert!(matches!(
            regex_function(&input),
            Err(Error::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn invalid_pattern_rejected() {
        let input = Expression::function(
            "regexMatch",
            vec![Expression::column("name"), Expression::string("[unclosed")],
        );
        assert!(matches!(
            regex_function(&input),
            Err(Error::InvalidLiteral(_))
        ));
    }

    #[test]
    fn other_function_is_not_recognized() {
        let input = Expression::function("toUpper", vec![Expression::column("name")]);
        assert_eq!(Ok(None), regex_function(&input));
    }
}

mod date {
    use super::*;

    #[test]
    fn explicit_format() {
        let left = Expression::function(
            "date",
            vec![Expression::column("created"), Expression::string("yyyy-MM-dd")],
        );
        let right = Expression::string("2016-05-25");
        let result = date_function(ComparisonOp::Gt, &left, &right)
            .unwrap()
            .unwrap();
        assert_eq!("created", result.column);
        assert_eq!(ComparisonOp::Gt, result.op);
        assert_eq!(
            bson::DateTime::from_chrono(Utc.with_ymd_and_hms(2016, 5, 25, 0, 0, 0).unwrap()),
            result.date
        );
    }

    #[test]
    fn natural_format() {
        let left = Expression::function(
            "date",
            vec![Expression::column("created"), Expression::string("natural")],
        );
        let right = Expression::string("May 25, 2016");
        assert!(date_function(ComparisonOp::Lte, &left, &right)
            .unwrap()
            .is_some());
    }

    #[test]
    fn equality_rejected() {
        let left = Expression::function(
            "date",
            vec![Expression::column("created"), Expression::string("natural")],
        );
        let right = Expression::string("May 25, 2016");
        assert!(matches!(
            date_function(ComparisonOp::Eq, &left, &right),
            Err(Error::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn wrong_arity_rejected() {
        let left = Expression::function("date", vec![Expression::column("created")]);
        let right = Expression::string("2016-05-25");
        assert!(matches!(
            date_function(ComparisonOp::Gt, &left, &right),
            Err(Error::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn other_function_is_not_recognized() {
        let left = Expression::function("year", vec![Expression::column("created")]);
        let right = Expression::string("2016");
        assert_eq!(Ok(None), date_function(ComparisonOp::Gt, &left, &right));
    }
}

mod object_id {
    use super::*;

    fn hex(s: &str) -> ObjectId {
        ObjectId::parse_str(s).unwrap()
    }

    #[test]
    fn comparison_parses_the_hex_value() {
        let left = Expression::function("OBJECTID", vec![Expression::string("_id")]);
        let right = Expression::string("507f1f77bcf86cd799439011");
        assert_eq!(
            Ok(Some(ObjectIdFunction {
                column: "_id".to_string(),
                values: vec![hex("507f1f77bcf86cd799439011")],
                negated: false,
            })),
            object_id_comparison(ComparisonOp::Eq, &left, &right)
        );
    }

    #[test]
    fn column_argument_may_be_bare() {
        let left = Expression::function("objectid", vec![Expression::column("_id")]);
        let right = Expression::string("507f1f77bcf86cd799439011");
        let result = object_id_comparison(ComparisonOp::Eq, &left, &right)
            .unwrap()
            .unwrap();
        assert_eq!("_id", result.column);
    }

    #[test]
    fn value_side_may_lead() {
        let left = Expression::string("507f1f77bcf86cd799439011");
        let right = Expression::function("objectid", vec![Expression::string("_id")]);
        let result = object_id_comparison(ComparisonOp::Eq, &left, &right)
            .unwrap()
            .unwrap();
        assert_eq!("_id", result.column);
        assert_eq!(vec![hex("507f1f77bcf86cd799439011")], result.values);
    }

    #[test]
    fn inequality_negates() {
        let left = Expression::function("objectid", vec![Expression::string("_id")]);
        let right = Expression::string("507f1f77bcf86cd799439011");
        let result = object_id_comparison(ComparisonOp::Ne, &left, &right)
            .unwrap()
            .unwrap();
        assert!(result.negated);
    }

    #[test]
    fn range_operator_rejected() {
        let left = Expression::function("objectid", vec![Expression::string("_id")]);
        let right = Expression::string("507f1f77bcf86cd799439011");
        assert!(matches!(
            object_id_comparison(ComparisonOp::Gt, &left, &right),
            Err(Error::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn invalid_hex_rejected() {
        let left = Expression::function("objectid", vec![Expression::string("_id")]);
        let right = Expression::string("nope");
        assert!(matches!(
            object_id_comparison(ComparisonOp::Eq, &left, &right),
            Err(Error::InvalidLiteral(_))
        ));
    }

    #[test]
    fn wrong_arity_rejected() {
        let left = Expression::function(
            "objectid",
            vec![Expression::string("_id"), Expression::string("extra")],
        );
        let right = Expression::string("507f1f77bcf86cd799439011");
        assert!(matches!(
            object_id_comparison(ComparisonOp::Eq, &left, &right),
            Err(Error::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn list_collects_every_value() {
        let left = Expression::function("objectid", vec![Expression::string("_id")]);
        let items = vec![
            Expression::string("507f1f77bcf86cd799439011"),
            Expression::string("507f191e810c19729de860ea"),
        ];
        assert_eq!(
            Ok(Some(ObjectIdFunction {
                column: "_id".to_string(),
                values: vec![
                    hex("507f1f77bcf86cd799439011"),
                    hex("507f191e810c19729de860ea"),
                ],
                negated: true,
            })),
            object_id_in_list(&left, &items, true)
        );
    }

    #[test]
    fn non_string_list_element_rejected() {
        let left = Expression::function("objectid", vec![Expression::string("_id")]);
        let items = vec![Expression::long(1)];
        assert!(matches!(
            object_id_in_list(&left, &items, false),
            Err(Error::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn other_shapes_are_not_recognized() {
        let call = Expression::function("year", vec![Expression::column("created")]);
        let literal = Expression::string("2016");
        assert_eq!(
            Ok(None),
            object_id_comparison(ComparisonOp::Eq, &call, &literal)
        );
        let column = Expression::column("_id");
        assert_eq!(Ok(None), object_id_in_list(&column, &[literal], false));
    }
}
