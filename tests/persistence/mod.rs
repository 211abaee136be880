mod reopen_case;
