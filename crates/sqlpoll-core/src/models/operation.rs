#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum QueryOperation {
    Submit,
    CheckStatus,
    StateChangeReason,
    Poll,
    FetchResults,
    Paginate,
    OutputLocation,
    Stop,
}

impl QueryOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::CheckStatus => "check_status",
            Self::StateChangeReason => "state_change_reason",
            Self::Poll => "poll",
            Self::FetchResults => "fetch_results",
            Self::Paginate => "paginate",
            Self::OutputLocation => "output_location",
            Self::Stop => "stop",
        }
    }
}
